//! Pause switch

use std::sync::Arc;

use custodia_access::AccessRegistry;
use custodia_types::{AccountId, CustodyError, Result, Role, StateError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseState {
    #[default]
    Active,
    Paused,
}

/// Admin-controlled switch that halts deposits and withdrawals
#[derive(Clone)]
pub struct PauseSwitch {
    access: AccessRegistry,
    state: Arc<RwLock<PauseState>>,
}

impl PauseSwitch {
    pub fn new(access: AccessRegistry, initial: PauseState) -> Self {
        Self {
            access,
            state: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn state(&self) -> PauseState {
        *self.state.read().await
    }

    pub async fn is_paused(&self) -> bool {
        self.state().await == PauseState::Paused
    }

    /// Fail with `ContractPaused` while paused
    pub async fn ensure_active(&self) -> Result<()> {
        match self.state().await {
            PauseState::Active => Ok(()),
            PauseState::Paused => Err(StateError::ContractPaused.into()),
        }
    }

    pub async fn pause(&self, caller: &AccountId) -> Result<()> {
        self.transition(caller, PauseState::Paused).await
    }

    pub async fn unpause(&self, caller: &AccountId) -> Result<()> {
        self.transition(caller, PauseState::Active).await
    }

    async fn transition(&self, caller: &AccountId, target: PauseState) -> Result<()> {
        self.access.ensure_role(caller, Role::Admin).await?;

        let mut state = self.state.write().await;
        if *state == target {
            let err: CustodyError = match target {
                PauseState::Paused => StateError::ContractPaused.into(),
                PauseState::Active => StateError::NotPaused.into(),
            };
            return Err(err);
        }
        *state = target;
        warn!(%caller, state = ?target, "Pause state changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AccountId {
        AccountId::new("admin")
    }

    #[tokio::test]
    async fn test_pause_and_unpause() {
        let switch = PauseSwitch::new(AccessRegistry::new(admin()), PauseState::Active);
        assert!(switch.ensure_active().await.is_ok());

        switch.pause(&admin()).await.unwrap();
        assert!(switch.is_paused().await);
        assert_eq!(
            switch.ensure_active().await.unwrap_err().error_code(),
            "CONTRACT_PAUSED"
        );

        switch.unpause(&admin()).await.unwrap();
        assert_eq!(switch.state().await, PauseState::Active);
    }

    #[tokio::test]
    async fn test_redundant_transitions_rejected() {
        let switch = PauseSwitch::new(AccessRegistry::new(admin()), PauseState::Active);

        let err = switch.unpause(&admin()).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_PAUSED");

        switch.pause(&admin()).await.unwrap();
        let err = switch.pause(&admin()).await.unwrap_err();
        assert_eq!(err.error_code(), "CONTRACT_PAUSED");
    }

    #[tokio::test]
    async fn test_non_admin_cannot_pause() {
        let switch = PauseSwitch::new(AccessRegistry::new(admin()), PauseState::Active);
        let err = switch.pause(&AccountId::new("mallory")).await.unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ROLE");
        assert!(!switch.is_paused().await);
    }
}
