//! Application state

use std::sync::Arc;

use custodia_vault::{InMemoryTransferService, Vault};

/// Shared by every handler
pub struct AppState {
    pub vault: Arc<Vault>,
    /// Local stand-in for the settlement environment, exposed through the
    /// simulation endpoints
    pub transfers: InMemoryTransferService,
}

impl AppState {
    pub fn new(vault: Arc<Vault>, transfers: InMemoryTransferService) -> Self {
        Self { vault, transfers }
    }
}
