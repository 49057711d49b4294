//! Vault configuration

use custodia_ledger::{LedgerLimits, DEFAULT_JOURNAL_CAPACITY, DEFAULT_OPERATION_RETENTION};
use custodia_types::{Amount, TokenRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ONE_NATIVE: u128 = 1_000_000_000_000_000_000;

/// Errors raised while building a vault
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Vault state has no admin")]
    NoAdmin,
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Immutable vault limits and token reference
///
/// Missing fields take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Aggregate cap on native holdings across all accounts
    pub bank_cap: Amount,
    /// Per-operation native withdrawal ceiling
    pub max_withdrawal_per_tx: Amount,
    /// Per-operation token withdrawal ceiling
    pub max_token_withdrawal_per_tx: Amount,
    /// The one fungible token this vault holds
    pub token: TokenRef,
    /// Deposits and withdrawals require allow-list membership
    pub whitelist_required: bool,
    /// Maximum age of an oracle round; `None` disables the check
    pub oracle_max_staleness_secs: Option<u64>,
    /// Number of notifications retained in the in-memory event log
    pub event_log_capacity: usize,
    /// Number of ledger journal entries retained in memory
    pub journal_capacity: usize,
    /// Number of applied operation ids remembered; a token deposit retried
    /// with an id older than this window is no longer recognised
    pub operation_id_retention: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            bank_cap: Amount::new(1_000 * ONE_NATIVE),
            max_withdrawal_per_tx: Amount::new(10 * ONE_NATIVE),
            max_token_withdrawal_per_tx: Amount::new(10_000_000_000),
            token: TokenRef::new("usdc", "USDC", 6),
            whitelist_required: true,
            oracle_max_staleness_secs: Some(3600),
            event_log_capacity: 1000,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            operation_id_retention: DEFAULT_OPERATION_RETENTION,
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bank_cap.is_zero() {
            return Err(ConfigError::invalid("bank_cap", "must be greater than zero"));
        }
        if self.max_withdrawal_per_tx.is_zero() {
            return Err(ConfigError::invalid(
                "max_withdrawal_per_tx",
                "must be greater than zero",
            ));
        }
        if self.max_token_withdrawal_per_tx.is_zero() {
            return Err(ConfigError::invalid(
                "max_token_withdrawal_per_tx",
                "must be greater than zero",
            ));
        }
        if self.token.id.trim().is_empty() {
            return Err(ConfigError::invalid("token.id", "must not be empty"));
        }
        if self.token.decimals > 38 {
            return Err(ConfigError::invalid(
                "token.decimals",
                format!("{} exceeds 38", self.token.decimals),
            ));
        }
        for (field, value) in [
            ("event_log_capacity", self.event_log_capacity),
            ("journal_capacity", self.journal_capacity),
            ("operation_id_retention", self.operation_id_retention),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        Ok(())
    }

    pub fn ledger_limits(&self) -> LedgerLimits {
        LedgerLimits {
            bank_cap: self.bank_cap,
            journal_capacity: self.journal_capacity,
            operation_retention: self.operation_id_retention,
        }
    }

    pub fn oracle_max_staleness(&self) -> Option<std::time::Duration> {
        self.oracle_max_staleness_secs
            .map(std::time::Duration::from_secs)
    }
}
