//! Deposit and withdrawal execution
//!
//! Every call moves through `Validating`, then `Mutating` and
//! `ExternalTransfer`, then `Committed | RolledBack`. Validation runs in a
//! fixed order (role, allow-list, pause, asset, non-zero, ceiling, capacity,
//! balance) and aborts before any mutation.
//!
//! Deposits pull funds into custody before crediting, so nothing is spendable
//! until the funds have arrived. Withdrawals debit before releasing, so a
//! re-entrant withdrawal sees the reduced balance; the debited amount keeps
//! occupying cap headroom until the release settles. No lock is held while
//! the transfer service runs.

use std::fmt;

use chrono::{DateTime, Utc};
use custodia_ledger::Posting;
use custodia_policy::{
    check_capacity, check_non_zero, check_sufficient_balance, check_withdrawal_ceiling,
};
use custodia_types::{
    AccountId, Amount, Asset, CustodyError, ExternalError, OperationId, Result, Role, StateError,
    VaultEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::Vault;

/// Phase of an executor call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Validating,
    Mutating,
    ExternalTransfer,
    Committed,
    RolledBack,
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Mutating => "mutating",
            Self::ExternalTransfer => "external_transfer",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Result of a committed deposit or withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    pub operation_id: OperationId,
    pub account: AccountId,
    pub asset: Asset,
    pub amount: Amount,
    pub balance_after: Amount,
    pub timestamp: DateTime<Utc>,
}

impl OperationReceipt {
    fn from_posting(posting: &Posting) -> Self {
        Self {
            operation_id: posting.operation_id,
            account: posting.account.clone(),
            asset: posting.asset.clone(),
            amount: posting.amount,
            balance_after: posting.balance_after,
            timestamp: Utc::now(),
        }
    }
}

fn trace_phase(operation_id: OperationId, phase: OperationPhase) {
    debug!(%operation_id, %phase, "Operation phase");
}

impl Vault {
    /// Deposit the native asset attached to the call
    pub async fn deposit_native(
        &self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<OperationReceipt> {
        self.deposit(caller, &Asset::Native, amount, None).await
    }

    /// Deposit the token, drawing on an approval `caller` gave the custodian.
    ///
    /// Passing the same `operation_id` on a retry guarantees the tokens are
    /// credited at most once while the id is within the retention window.
    pub async fn deposit_token(
        &self,
        caller: &AccountId,
        amount: Amount,
        operation_id: Option<OperationId>,
    ) -> Result<OperationReceipt> {
        let token = self.token_asset();
        self.deposit(caller, &token, amount, operation_id).await
    }

    pub async fn withdraw_native(
        &self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<OperationReceipt> {
        self.withdraw(caller, &Asset::Native, amount).await
    }

    pub async fn withdraw_token(
        &self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<OperationReceipt> {
        let token = self.token_asset();
        self.withdraw(caller, &token, amount).await
    }

    /// Deposit `amount` of `asset` into the caller's custodied balance
    pub async fn deposit(
        &self,
        caller: &AccountId,
        asset: &Asset,
        amount: Amount,
        operation_id: Option<OperationId>,
    ) -> Result<OperationReceipt> {
        let op = operation_id.unwrap_or_default();
        trace_phase(op, OperationPhase::Validating);

        self.authorize(caller, Role::Depositor).await?;
        self.pause.ensure_active().await?;
        self.ensure_supported(asset)?;
        check_non_zero(amount)?;
        if asset.is_native() {
            check_capacity(self.ledger.total_native_held().await, amount, self.config.bank_cap)?;
        }

        let posting = self.pull_then_credit(op, caller, asset, amount).await?;

        trace_phase(op, OperationPhase::Committed);
        self.events
            .emit(VaultEvent::Deposit {
                account: caller.clone(),
                asset: asset.clone(),
                amount,
                timestamp: Utc::now(),
            })
            .await;
        info!(
            operation_id = %op,
            account = %caller,
            %asset,
            %amount,
            balance = %posting.balance_after,
            "Deposit committed"
        );
        Ok(OperationReceipt::from_posting(&posting))
    }

    /// Funds are pulled into custody first; the credit follows, keyed by the operation id
    async fn pull_then_credit(
        &self,
        op: OperationId,
        caller: &AccountId,
        asset: &Asset,
        amount: Amount,
    ) -> Result<Posting> {
        if self.ledger.is_applied(&op).await {
            return Err(StateError::DuplicateOperation {
                operation_id: op.to_string(),
            }
            .into());
        }

        trace_phase(op, OperationPhase::ExternalTransfer);
        self.transfers.pull(caller, asset, amount).await?;

        trace_phase(op, OperationPhase::Mutating);
        match self.ledger.credit(op, caller, asset, amount).await {
            Ok(posting) => Ok(posting),
            Err(e) => Err(self.return_pulled(op, caller, asset, amount, e).await),
        }
    }

    /// Send pulled funds back after the credit failed
    async fn return_pulled(
        &self,
        op: OperationId,
        caller: &AccountId,
        asset: &Asset,
        amount: Amount,
        cause: CustodyError,
    ) -> CustodyError {
        trace_phase(op, OperationPhase::RolledBack);
        warn!(
            operation_id = %op,
            account = %caller,
            %asset,
            error = %cause,
            "Credit failed, returning pulled funds"
        );
        match self.transfers.release(caller, asset, amount).await {
            Ok(()) => cause,
            Err(release_err) => {
                error!(
                    operation_id = %op,
                    account = %caller,
                    %asset,
                    %amount,
                    error = %release_err,
                    "Failed to return pulled funds"
                );
                StateError::RollbackFailed {
                    operation_id: op.to_string(),
                    reason: format!(
                        "{}; returning {} {} to {} failed: {}",
                        cause, amount, asset, caller, release_err
                    ),
                }
                .into()
            }
        }
    }

    /// Withdraw `amount` of `asset` from the caller's custodied balance
    ///
    /// The ledger is debited before funds are released; a failed release
    /// reverses the debit.
    pub async fn withdraw(
        &self,
        caller: &AccountId,
        asset: &Asset,
        amount: Amount,
    ) -> Result<OperationReceipt> {
        let op = OperationId::new();
        trace_phase(op, OperationPhase::Validating);

        self.authorize(caller, Role::Withdrawer).await?;
        self.pause.ensure_active().await?;
        self.ensure_supported(asset)?;
        check_non_zero(amount)?;
        check_withdrawal_ceiling(amount, self.withdrawal_ceiling(asset))?;
        check_sufficient_balance(self.ledger.balance(caller, asset).await, amount)?;

        trace_phase(op, OperationPhase::Mutating);
        let posting = self.ledger.debit(op, caller, asset, amount).await?;

        trace_phase(op, OperationPhase::ExternalTransfer);
        if let Err(e) = self.transfers.release(caller, asset, amount).await {
            return Err(self.roll_back(&posting, e).await);
        }
        self.ledger.settle(&posting).await;

        trace_phase(op, OperationPhase::Committed);
        self.events
            .emit(VaultEvent::Withdrawal {
                account: caller.clone(),
                asset: asset.clone(),
                amount,
                timestamp: Utc::now(),
            })
            .await;
        info!(
            operation_id = %op,
            account = %caller,
            %asset,
            %amount,
            balance = %posting.balance_after,
            "Withdrawal committed"
        );
        Ok(OperationReceipt::from_posting(&posting))
    }

    /// Role first, then the allow-list when it is enforced
    async fn authorize(&self, caller: &AccountId, role: Role) -> Result<()> {
        self.access.ensure_role(caller, role).await?;
        if self.config.whitelist_required {
            self.access.ensure_whitelisted(caller).await?;
        }
        Ok(())
    }

    fn withdrawal_ceiling(&self, asset: &Asset) -> Amount {
        match asset {
            Asset::Native => self.config.max_withdrawal_per_tx,
            Asset::Token(_) => self.config.max_token_withdrawal_per_tx,
        }
    }

    /// Reverse a debit after a failed release and return the transfer error
    async fn roll_back(&self, posting: &Posting, cause: ExternalError) -> CustodyError {
        trace_phase(posting.operation_id, OperationPhase::RolledBack);
        warn!(
            operation_id = %posting.operation_id,
            account = %posting.account,
            asset = %posting.asset,
            amount = %posting.amount,
            error = %cause,
            "External transfer failed, rolling back"
        );
        match self.ledger.reverse(posting).await {
            Ok(_) => cause.into(),
            Err(e) => {
                error!(
                    operation_id = %posting.operation_id,
                    error = %e,
                    "Rollback of ledger posting failed"
                );
                StateError::RollbackFailed {
                    operation_id: posting.operation_id.to_string(),
                    reason: format!("{}; reversing the ledger posting failed: {}", cause, e),
                }
                .into()
            }
        }
    }
}
