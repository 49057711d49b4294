//! Custodia Vault - Policy-enforcing custody of native and token balances
//!
//! The [`Vault`] is the single entry point for every public operation. It
//! composes:
//!
//! 1. [`AccessRegistry`] - who may deposit, withdraw and administer
//! 2. [`PauseSwitch`] - admin halt of deposits and withdrawals
//! 3. [`Ledger`] - per-account balances, capped and journaled
//! 4. [`TransferService`] - the external collaborator that moves funds
//! 5. [`PriceOracleAdapter`] - optional USD valuation
//! 6. [`EmergencyRecovery`] - admin escape hatch for custody funds
//!
//! Committed operations emit [`VaultEvent`]s; rolled-back operations never do.
//!
//! # Example
//!
//! ```ignore
//! let transfers = Arc::new(InMemoryTransferService::new());
//! let vault = Vault::new(VaultConfig::default(), admin.clone(), transfers)?;
//! vault.grant_role(&admin, &alice, Role::Depositor).await?;
//! vault.add_to_whitelist(&admin, &alice).await?;
//! vault.deposit_native(&alice, Amount::new(1_000)).await?;
//! ```

pub mod config;
pub mod events;
pub mod executor;
pub mod pause;
pub mod recovery;
pub mod transfer;

pub use config::{ConfigError, VaultConfig};
pub use events::EventLog;
pub use executor::{OperationPhase, OperationReceipt};
pub use pause::{PauseState, PauseSwitch};
pub use recovery::EmergencyRecovery;
pub use transfer::{
    AllowanceRecord, CustodyRecord, InMemoryTransferService, SettlementSnapshot, TransferResult,
    TransferService, WalletRecord,
};

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use custodia_access::{AccessRegistry, AccessState};
use custodia_ledger::{GlobalCounters, Ledger, LedgerEntry, LedgerSnapshot};
use custodia_oracle::{PriceOracleAdapter, PriceQuote};
use custodia_types::{
    AccountId, Amount, Asset, AssetKind, ExternalError, Result, Role, UsdValue, ValidationError,
    VaultEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

/// Durable vault state
///
/// One record per (account, asset) balance, one role set and allow-list flag
/// per account, the configuration, the pause state and the scalar counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub config: VaultConfig,
    pub pause: PauseState,
    pub access: AccessState,
    pub ledger: LedgerSnapshot,
}

/// The custodial vault
pub struct Vault {
    config: VaultConfig,
    access: AccessRegistry,
    ledger: Ledger,
    pause: PauseSwitch,
    transfers: Arc<dyn TransferService>,
    recovery: EmergencyRecovery,
    oracle: Option<PriceOracleAdapter>,
    events: EventLog,
}

impl Vault {
    /// Create an empty vault; `admin` receives the bootstrap Admin role
    pub fn new(
        config: VaultConfig,
        admin: AccountId,
        transfers: Arc<dyn TransferService>,
    ) -> std::result::Result<Self, ConfigError> {
        if admin.is_null() {
            return Err(ConfigError::NoAdmin);
        }
        let access = AccessRegistry::new(admin);
        let ledger = Ledger::with_limits(config.ledger_limits());
        Self::assemble(config, access, ledger, PauseState::Active, transfers)
    }

    /// Rebuild a vault from a snapshot
    pub fn restore(
        snapshot: VaultSnapshot,
        transfers: Arc<dyn TransferService>,
    ) -> std::result::Result<Self, ConfigError> {
        let has_admin = snapshot
            .access
            .roles
            .values()
            .any(|roles| roles.contains(&Role::Admin));
        if !has_admin {
            return Err(ConfigError::NoAdmin);
        }
        let access = AccessRegistry::from_state(snapshot.access);
        let ledger = Ledger::restore(snapshot.config.ledger_limits(), snapshot.ledger);
        Self::assemble(snapshot.config, access, ledger, snapshot.pause, transfers)
    }

    fn assemble(
        config: VaultConfig,
        access: AccessRegistry,
        ledger: Ledger,
        pause: PauseState,
        transfers: Arc<dyn TransferService>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let events = EventLog::new(config.event_log_capacity);
        Ok(Self {
            pause: PauseSwitch::new(access.clone(), pause),
            recovery: EmergencyRecovery::new(
                access.clone(),
                transfers.clone(),
                config.token.clone(),
            ),
            config,
            access,
            ledger,
            transfers,
            oracle: None,
            events,
        })
    }

    /// Attach a price oracle used for valuation queries
    pub fn with_oracle(mut self, oracle: PriceOracleAdapter) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The configured token as an asset
    pub fn token_asset(&self) -> Asset {
        Asset::Token(self.config.token.clone())
    }

    pub fn asset(&self, kind: AssetKind) -> Asset {
        match kind {
            AssetKind::Native => Asset::Native,
            AssetKind::Token => self.token_asset(),
        }
    }

    fn ensure_supported(&self, asset: &Asset) -> Result<()> {
        match asset {
            Asset::Native => Ok(()),
            Asset::Token(token) if *token == self.config.token => Ok(()),
            other => Err(ValidationError::UnsupportedAsset {
                asset: other.to_string(),
            }
            .into()),
        }
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn add_to_whitelist(&self, caller: &AccountId, account: &AccountId) -> Result<bool> {
        let changed = self.access.set_whitelisted(caller, account, true).await?;
        if changed {
            self.events
                .emit(VaultEvent::Whitelisted {
                    account: account.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }
        Ok(changed)
    }

    pub async fn remove_from_whitelist(
        &self,
        caller: &AccountId,
        account: &AccountId,
    ) -> Result<bool> {
        let changed = self.access.set_whitelisted(caller, account, false).await?;
        if changed {
            self.events
                .emit(VaultEvent::RemovedFromWhitelist {
                    account: account.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }
        Ok(changed)
    }

    pub async fn grant_role(
        &self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> Result<bool> {
        let changed = self.access.grant_role(caller, account, role).await?;
        if changed {
            self.events
                .emit(VaultEvent::RoleGranted {
                    account: account.clone(),
                    role,
                    granted_by: caller.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }
        Ok(changed)
    }

    pub async fn revoke_role(
        &self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> Result<bool> {
        let changed = self.access.revoke_role(caller, account, role).await?;
        if changed {
            self.events
                .emit(VaultEvent::RoleRevoked {
                    account: account.clone(),
                    role,
                    revoked_by: caller.clone(),
                    timestamp: Utc::now(),
                })
                .await;
        }
        Ok(changed)
    }

    pub async fn pause(&self, caller: &AccountId) -> Result<()> {
        self.pause.pause(caller).await?;
        self.events
            .emit(VaultEvent::Paused {
                by: caller.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }

    pub async fn unpause(&self, caller: &AccountId) -> Result<()> {
        self.pause.unpause(caller).await?;
        self.events
            .emit(VaultEvent::Unpaused {
                by: caller.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }

    /// Move custody funds to `destination` without touching the ledger.
    ///
    /// Returns the amount moved; a native amount of zero recovers everything
    /// the custodian holds. Available while paused.
    pub async fn emergency_withdraw(
        &self,
        caller: &AccountId,
        asset: &Asset,
        amount: Amount,
        destination: &AccountId,
    ) -> Result<Amount> {
        let moved = self
            .recovery
            .recover(caller, asset, amount, destination)
            .await?;
        self.events
            .emit(VaultEvent::EmergencyWithdrawal {
                admin: caller.clone(),
                asset: asset.clone(),
                amount: moved,
                destination: destination.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(moved)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn balance(&self, account: &AccountId, asset: &Asset) -> Result<Amount> {
        self.ensure_supported(asset)?;
        Ok(self.ledger.balance(account, asset).await)
    }

    pub async fn balances_of(&self, account: &AccountId) -> Vec<(Asset, Amount)> {
        self.ledger.balances_of(account).await
    }

    pub async fn account_entries(&self, account: &AccountId) -> Vec<LedgerEntry> {
        self.ledger.account_entries(account).await
    }

    pub async fn deposit_count(&self) -> u64 {
        self.ledger.deposit_count().await
    }

    pub async fn withdrawal_count(&self) -> u64 {
        self.ledger.withdrawal_count().await
    }

    pub async fn counters(&self) -> GlobalCounters {
        self.ledger.counters().await
    }

    pub async fn is_paused(&self) -> bool {
        self.pause.is_paused().await
    }

    pub async fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.access.has_role(account, role).await
    }

    pub async fn roles_of(&self, account: &AccountId) -> BTreeSet<Role> {
        self.access.roles_of(account).await
    }

    pub async fn is_whitelisted(&self, account: &AccountId) -> bool {
        self.access.is_whitelisted(account).await
    }

    fn oracle(&self) -> Result<&PriceOracleAdapter> {
        self.oracle
            .as_ref()
            .ok_or_else(|| ExternalError::oracle_invalid("no price feed configured").into())
    }

    /// Latest validated native/USD quote
    pub async fn latest_price(&self) -> Result<PriceQuote> {
        self.oracle()?.latest_price().await
    }

    /// USD value (1e8-scaled) of a native amount
    pub async fn convert_to_usd(&self, native_amount: Amount) -> Result<UsdValue> {
        self.oracle()?.convert_to_usd(native_amount).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    /// Most recent notifications, newest first
    pub async fn recent_events(&self, limit: usize) -> Vec<VaultEvent> {
        self.events.recent(limit).await
    }

    pub async fn snapshot(&self) -> VaultSnapshot {
        let snapshot = VaultSnapshot {
            config: self.config.clone(),
            pause: self.pause.state().await,
            access: self.access.snapshot().await,
            ledger: self.ledger.snapshot().await,
        };
        info!(
            balances = snapshot.ledger.balances.len(),
            accounts = snapshot.access.roles.len(),
            "Vault snapshot taken"
        );
        snapshot
    }
}
