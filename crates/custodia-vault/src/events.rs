//! Notification fan-out and bounded event log

use std::collections::VecDeque;
use std::sync::Arc;

use custodia_types::VaultEvent;
use tokio::sync::{broadcast, RwLock};

const CHANNEL_CAPACITY: usize = 1000;

/// Broadcasts committed-operation notifications and keeps the most recent ones
#[derive(Clone)]
pub struct EventLog {
    sender: broadcast::Sender<VaultEvent>,
    log: Arc<RwLock<VecDeque<VaultEvent>>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            log: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn emit(&self, event: VaultEvent) {
        {
            let mut log = self.log.write().await;
            if log.len() == self.capacity {
                log.pop_front();
            }
            log.push_back(event.clone());
        }
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.sender.subscribe()
    }

    /// Most recent events, newest first
    pub async fn recent(&self, limit: usize) -> Vec<VaultEvent> {
        self.log.read().await.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }
}
