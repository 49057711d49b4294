//! Custodia Ledger - Custodied balances per account and asset
//!
//! The ledger is:
//! - Account-keyed by AccountId, asset-scoped (Native or the Token)
//! - Capped (aggregate native holdings never exceed the bank cap)
//! - Journaled (every credit, debit and reversal appends an entry; the
//!   in-memory journal keeps the most recent entries only)
//! - Operation-keyed (an operation id is applied at most once within the
//!   retention window)
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. Sum of native balances plus unsettled native debits equals
//!    `total_native_held`, which never exceeds the cap after a credit
//! 3. Every mutation (balance, totals, counters, journal) happens under one
//!    write lock, so readers never observe a partial operation
//! 4. A reversal restores exactly what its posting changed
//!
//! A debit leaves its amount in the held total until [`Ledger::settle`]
//! confirms the funds left custody. Until then the amount still occupies cap
//! headroom, so a failed release can be reversed without overshooting the cap.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use custodia_policy::{check_capacity, check_non_zero, check_sufficient_balance};
use custodia_types::{
    AccountId, Amount, Asset, EntryId, OperationId, Result, StateError, ValidationError,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Journal entries kept in memory by default
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

/// Applied operation ids remembered by default
pub const DEFAULT_OPERATION_RETENTION: usize = 100_000;

/// Direction of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

/// Type of journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryType {
    Credit,
    Debit,
    /// Undoes an earlier entry of the same operation
    Reversal { of: EntryId },
}

/// A single journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub operation_id: OperationId,
    pub account: AccountId,
    pub asset: Asset,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub balance_after: Amount,
    pub created_at: DateTime<Utc>,
}

/// Proof of an applied credit or debit; the only handle that can reverse it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub entry_id: EntryId,
    pub operation_id: OperationId,
    pub account: AccountId,
    pub asset: Asset,
    pub direction: Direction,
    pub amount: Amount,
    pub balance_after: Amount,
}

/// Aggregate holdings and operation counts
///
/// Held totals include debits whose release has not settled yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCounters {
    pub total_native_held: Amount,
    pub total_token_held: Amount,
    pub deposit_count: u64,
    pub withdrawal_count: u64,
}

impl GlobalCounters {
    fn held_mut(&mut self, asset: &Asset) -> &mut Amount {
        match asset {
            Asset::Native => &mut self.total_native_held,
            Asset::Token(_) => &mut self.total_token_held,
        }
    }
}

/// Persisted balance record, one per (account, asset)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub account: AccountId,
    pub asset: Asset,
    pub amount: Amount,
}

/// Durable ledger state: balances and scalar counters, no journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balances: Vec<BalanceRecord>,
    pub counters: GlobalCounters,
}

/// Limits a ledger is built with; fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLimits {
    /// Aggregate cap on native holdings
    pub bank_cap: Amount,
    /// Journal entries kept in memory
    pub journal_capacity: usize,
    /// Applied operation ids remembered for duplicate detection
    pub operation_retention: usize,
}

impl LedgerLimits {
    /// Default retention with the given cap
    pub fn new(bank_cap: Amount) -> Self {
        Self {
            bank_cap,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            operation_retention: DEFAULT_OPERATION_RETENTION,
        }
    }
}

/// Set that forgets its oldest members past `capacity`
#[derive(Debug)]
struct RecentSet<T> {
    capacity: usize,
    members: HashMap<T, u64>,
    order: VecDeque<(T, u64)>,
    next_seq: u64,
}

impl<T: Clone + Eq + Hash> RecentSet<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn contains(&self, item: &T) -> bool {
        self.members.contains_key(item)
    }

    fn insert(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.members.insert(item.clone(), seq);
        self.order.push_back((item, seq));
        while self.order.len() > self.capacity {
            let Some((oldest, seq)) = self.order.pop_front() else {
                break;
            };
            // a removed and re-inserted member carries a newer sequence number
            if self.members.get(&oldest) == Some(&seq) {
                self.members.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, item: &T) {
        self.members.remove(item);
    }
}

#[derive(Debug)]
struct LedgerState {
    balances: HashMap<(AccountId, Asset), Amount>,
    counters: GlobalCounters,
    entries: VecDeque<LedgerEntry>,
    journal_capacity: usize,
    applied_operations: RecentSet<OperationId>,
    reversed_entries: RecentSet<EntryId>,
    unsettled_debits: HashMap<EntryId, (Asset, Amount)>,
}

impl LedgerState {
    fn new(limits: &LedgerLimits) -> Self {
        Self {
            balances: HashMap::new(),
            counters: GlobalCounters::default(),
            entries: VecDeque::new(),
            journal_capacity: limits.journal_capacity,
            applied_operations: RecentSet::new(limits.operation_retention),
            reversed_entries: RecentSet::new(limits.operation_retention),
            unsettled_debits: HashMap::new(),
        }
    }

    fn balance(&self, account: &AccountId, asset: &Asset) -> Amount {
        self.balances
            .get(&(account.clone(), asset.clone()))
            .copied()
            .unwrap_or(Amount::zero())
    }

    fn set_balance(&mut self, account: &AccountId, asset: &Asset, amount: Amount) {
        let key = (account.clone(), asset.clone());
        if amount.is_zero() {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, amount);
        }
    }

    fn ensure_fresh(&self, operation_id: OperationId) -> Result<()> {
        if self.applied_operations.contains(&operation_id) {
            return Err(StateError::DuplicateOperation {
                operation_id: operation_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Held totals as they stand once every unsettled debit has left custody
    fn settled_counters(&self) -> GlobalCounters {
        let mut counters = self.counters;
        for (asset, amount) in self.unsettled_debits.values() {
            let held = counters.held_mut(asset);
            *held = held.saturating_sub(*amount);
        }
        counters
    }

    fn journal(
        &mut self,
        operation_id: OperationId,
        account: &AccountId,
        asset: &Asset,
        entry_type: EntryType,
        amount: Amount,
        balance_after: Amount,
    ) -> EntryId {
        let entry_id = EntryId::new();
        self.entries.push_back(LedgerEntry {
            entry_id,
            operation_id,
            account: account.clone(),
            asset: asset.clone(),
            entry_type,
            amount,
            balance_after,
            created_at: Utc::now(),
        });
        while self.entries.len() > self.journal_capacity {
            self.entries.pop_front();
        }
        entry_id
    }
}

/// The custodial ledger
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Ledger {
    limits: LedgerLimits,
    state: Arc<RwLock<LedgerState>>,
}

impl Ledger {
    /// Create an empty ledger accepting at most `bank_cap` aggregate native holdings
    pub fn new(bank_cap: Amount) -> Self {
        Self::with_limits(LedgerLimits::new(bank_cap))
    }

    pub fn with_limits(limits: LedgerLimits) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::new(&limits))),
            limits,
        }
    }

    /// Rebuild a ledger from a snapshot
    pub fn restore(limits: LedgerLimits, snapshot: LedgerSnapshot) -> Self {
        let mut state = LedgerState::new(&limits);
        state.counters = snapshot.counters;
        for record in snapshot.balances {
            state.set_balance(&record.account, &record.asset, record.amount);
        }
        Self {
            limits,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn bank_cap(&self) -> Amount {
        self.limits.bank_cap
    }

    pub fn limits(&self) -> LedgerLimits {
        self.limits
    }

    /// Get the balance of an account for an asset
    pub async fn balance(&self, account: &AccountId, asset: &Asset) -> Amount {
        self.state.read().await.balance(account, asset)
    }

    /// All non-zero balances of an account
    pub async fn balances_of(&self, account: &AccountId) -> Vec<(Asset, Amount)> {
        let state = self.state.read().await;
        state
            .balances
            .iter()
            .filter(|((owner, _), _)| owner == account)
            .map(|((_, asset), amount)| (asset.clone(), *amount))
            .collect()
    }

    /// Credit an account
    ///
    /// Native credits fail with `CapacityExceeded` if aggregate native holdings
    /// would exceed the bank cap. Counts as one deposit.
    pub async fn credit(
        &self,
        operation_id: OperationId,
        account: &AccountId,
        asset: &Asset,
        amount: Amount,
    ) -> Result<Posting> {
        check_non_zero(amount)?;

        let mut state = self.state.write().await;
        state.ensure_fresh(operation_id)?;

        let held = *state.counters.held_mut(asset);
        if asset.is_native() {
            check_capacity(held, amount, self.limits.bank_cap)?;
        }
        let new_held = held
            .checked_add(amount)
            .ok_or(ValidationError::AmountOverflow)?;
        let new_balance = state
            .balance(account, asset)
            .checked_add(amount)
            .ok_or(ValidationError::AmountOverflow)?;

        state.set_balance(account, asset, new_balance);
        *state.counters.held_mut(asset) = new_held;
        state.counters.deposit_count += 1;
        state.applied_operations.insert(operation_id);
        let entry_id = state.journal(
            operation_id,
            account,
            asset,
            EntryType::Credit,
            amount,
            new_balance,
        );

        debug!(%operation_id, %account, %asset, %amount, balance = %new_balance, "Ledger credit");
        Ok(Posting {
            entry_id,
            operation_id,
            account: account.clone(),
            asset: asset.clone(),
            direction: Direction::Credit,
            amount,
            balance_after: new_balance,
        })
    }

    /// Debit an account
    ///
    /// Fails with `InsufficientBalance` if the balance would go negative.
    /// Counts as one withdrawal. The amount stays in the held total until the
    /// debit is settled or reversed.
    pub async fn debit(
        &self,
        operation_id: OperationId,
        account: &AccountId,
        asset: &Asset,
        amount: Amount,
    ) -> Result<Posting> {
        check_non_zero(amount)?;

        let mut state = self.state.write().await;
        state.ensure_fresh(operation_id)?;

        let current = state.balance(account, asset);
        check_sufficient_balance(current, amount)?;
        let new_balance = current.saturating_sub(amount);

        state.set_balance(account, asset, new_balance);
        state.counters.withdrawal_count += 1;
        state.applied_operations.insert(operation_id);
        let entry_id = state.journal(
            operation_id,
            account,
            asset,
            EntryType::Debit,
            amount,
            new_balance,
        );
        state
            .unsettled_debits
            .insert(entry_id, (asset.clone(), amount));

        debug!(%operation_id, %account, %asset, %amount, balance = %new_balance, "Ledger debit");
        Ok(Posting {
            entry_id,
            operation_id,
            account: account.clone(),
            asset: asset.clone(),
            direction: Direction::Debit,
            amount,
            balance_after: new_balance,
        })
    }

    /// Confirm that a debit's funds left custody and drop them from the held total
    ///
    /// No-op for credits and for debits already settled or reversed.
    pub async fn settle(&self, posting: &Posting) {
        let mut state = self.state.write().await;
        let Some((asset, amount)) = state.unsettled_debits.remove(&posting.entry_id) else {
            return;
        };
        let held = state.counters.held_mut(&asset);
        *held = held.saturating_sub(amount);
        debug!(
            operation_id = %posting.operation_id,
            %asset,
            %amount,
            "Ledger debit settled"
        );
    }

    /// Undo a posting made by this ledger
    ///
    /// Restores the balance, the held total and the operation counter, frees
    /// the operation id for a retry, and journals a reversal entry. An
    /// unsettled debit never left the held total, so reversing it needs no cap
    /// check; reversing a settled native debit does.
    pub async fn reverse(&self, posting: &Posting) -> Result<Amount> {
        let mut state = self.state.write().await;
        if state.reversed_entries.contains(&posting.entry_id) {
            return Err(StateError::DuplicateOperation {
                operation_id: posting.operation_id.to_string(),
            }
            .into());
        }

        let current = state.balance(&posting.account, &posting.asset);
        let restored = match posting.direction {
            Direction::Credit => {
                check_sufficient_balance(current, posting.amount)?;
                let held = state.counters.held_mut(&posting.asset);
                *held = held.saturating_sub(posting.amount);
                state.counters.deposit_count = state.counters.deposit_count.saturating_sub(1);
                current.saturating_sub(posting.amount)
            }
            Direction::Debit => {
                let restored = current
                    .checked_add(posting.amount)
                    .ok_or(ValidationError::AmountOverflow)?;
                if state.unsettled_debits.remove(&posting.entry_id).is_none() {
                    let held = *state.counters.held_mut(&posting.asset);
                    if posting.asset.is_native() {
                        check_capacity(held, posting.amount, self.limits.bank_cap)?;
                    }
                    *state.counters.held_mut(&posting.asset) = held
                        .checked_add(posting.amount)
                        .ok_or(ValidationError::AmountOverflow)?;
                }
                state.counters.withdrawal_count =
                    state.counters.withdrawal_count.saturating_sub(1);
                restored
            }
        };

        state.set_balance(&posting.account, &posting.asset, restored);
        state.applied_operations.remove(&posting.operation_id);
        state.reversed_entries.insert(posting.entry_id);
        state.journal(
            posting.operation_id,
            &posting.account,
            &posting.asset,
            EntryType::Reversal {
                of: posting.entry_id,
            },
            posting.amount,
            restored,
        );

        warn!(
            operation_id = %posting.operation_id,
            account = %posting.account,
            asset = %posting.asset,
            amount = %posting.amount,
            "Ledger posting reversed"
        );
        Ok(restored)
    }

    /// Whether an operation id has been applied (and not reversed)
    pub async fn is_applied(&self, operation_id: &OperationId) -> bool {
        self.state
            .read()
            .await
            .applied_operations
            .contains(operation_id)
    }

    pub async fn counters(&self) -> GlobalCounters {
        self.state.read().await.counters
    }

    pub async fn total_native_held(&self) -> Amount {
        self.state.read().await.counters.total_native_held
    }

    pub async fn deposit_count(&self) -> u64 {
        self.state.read().await.counters.deposit_count
    }

    pub async fn withdrawal_count(&self) -> u64 {
        self.state.read().await.counters.withdrawal_count
    }

    /// Get the retained entries for an account
    pub async fn account_entries(&self, account: &AccountId) -> Vec<LedgerEntry> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect()
    }

    /// Get recent entries (newest first)
    pub async fn recent_entries(&self, limit: usize) -> Vec<LedgerEntry> {
        let state = self.state.read().await;
        state.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained journal entries
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Get all account IDs with a non-zero balance
    pub async fn accounts(&self) -> Vec<AccountId> {
        let state = self.state.read().await;
        let mut accounts: Vec<AccountId> = state
            .balances
            .keys()
            .map(|(account, _)| account.clone())
            .collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }

    /// Balances and counters, with unsettled debits treated as settled
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read().await;
        let mut balances: Vec<BalanceRecord> = state
            .balances
            .iter()
            .map(|((account, asset), amount)| BalanceRecord {
                account: account.clone(),
                asset: asset.clone(),
                amount: *amount,
            })
            .collect();
        balances.sort_by(|a, b| {
            a.account
                .cmp(&b.account)
                .then_with(|| a.asset.is_native().cmp(&b.asset.is_native()).reverse())
        });
        LedgerSnapshot {
            balances,
            counters: state.settled_counters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::{CustodyError, ErrorKind};

    fn usdc() -> Asset {
        Asset::token("0xa0b8", "USDC", 6)
    }

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    async fn native_sum(ledger: &Ledger) -> Amount {
        let snapshot = ledger.snapshot().await;
        snapshot
            .balances
            .iter()
            .filter(|r| r.asset.is_native())
            .fold(Amount::zero(), |acc, r| acc.checked_add(r.amount).unwrap())
    }

    #[tokio::test]
    async fn test_credit_and_balance() {
        let ledger = Ledger::new(Amount::new(1_000));

        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::zero());

        let posting = ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(400))
            .await
            .unwrap();

        assert_eq!(posting.balance_after, Amount::new(400));
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::new(400));
        assert_eq!(ledger.total_native_held().await, Amount::new(400));
        assert_eq!(ledger.deposit_count().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_applies_to_native_only() {
        let ledger = Ledger::new(Amount::new(100));

        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(40))
            .await
            .unwrap();
        let err = ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(70))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CAPACITY_EXCEEDED");
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::new(40));
        assert_eq!(ledger.total_native_held().await, Amount::new(40));
        assert_eq!(ledger.deposit_count().await, 1);

        ledger
            .credit(OperationId::new(), &alice(), &usdc(), Amount::new(10_000))
            .await
            .unwrap();
        assert_eq!(ledger.counters().await.total_token_held, Amount::new(10_000));
    }

    #[tokio::test]
    async fn test_no_negative_balance() {
        let ledger = Ledger::new(Amount::new(1_000));
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(100))
            .await
            .unwrap();

        let result = ledger
            .debit(OperationId::new(), &alice(), &Asset::Native, Amount::new(200))
            .await;
        assert!(matches!(
            result,
            Err(CustodyError::Validation(ValidationError::InsufficientBalance { .. }))
        ));
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::new(100));
        assert_eq!(ledger.withdrawal_count().await, 0);
    }

    #[tokio::test]
    async fn test_debit_unknown_account_is_insufficient() {
        let ledger = Ledger::new(Amount::new(1_000));
        let err = ledger
            .debit(OperationId::new(), &AccountId::new("ghost"), &usdc(), Amount::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let ledger = Ledger::new(Amount::new(1_000));
        let err = ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::zero())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_ZERO");
        assert_eq!(ledger.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_operation_rejected() {
        let ledger = Ledger::new(Amount::new(1_000));
        let op = OperationId::new();
        ledger.credit(op, &alice(), &usdc(), Amount::new(5)).await.unwrap();

        let err = ledger.credit(op, &alice(), &usdc(), Amount::new(5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(ledger.balance(&alice(), &usdc()).await, Amount::new(5));
        assert!(ledger.is_applied(&op).await);
    }

    #[tokio::test]
    async fn test_reverse_debit_restores_everything() {
        let ledger = Ledger::new(Amount::new(1_000));
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(10))
            .await
            .unwrap();
        let before = ledger.counters().await;

        let posting = ledger
            .debit(OperationId::new(), &alice(), &Asset::Native, Amount::new(10))
            .await
            .unwrap();
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::zero());

        let restored = ledger.reverse(&posting).await.unwrap();
        assert_eq!(restored, Amount::new(10));
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::new(10));
        assert_eq!(ledger.counters().await, before);
        assert!(!ledger.is_applied(&posting.operation_id).await);

        let entries = ledger.account_entries(&alice()).await;
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[2].entry_type,
            EntryType::Reversal { of: posting.entry_id }
        );
    }

    #[tokio::test]
    async fn test_reverse_credit_and_double_reverse() {
        let ledger = Ledger::new(Amount::new(1_000));
        let posting = ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(30))
            .await
            .unwrap();

        ledger.reverse(&posting).await.unwrap();
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::zero());
        assert_eq!(ledger.counters().await, GlobalCounters::default());

        let err = ledger.reverse(&posting).await.unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_OPERATION");
    }

    #[tokio::test]
    async fn test_native_sum_matches_total() {
        let ledger = Ledger::new(Amount::new(1_000));
        let bob = AccountId::new("bob");
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(300))
            .await
            .unwrap();
        ledger
            .credit(OperationId::new(), &bob, &Asset::Native, Amount::new(500))
            .await
            .unwrap();
        let debit = ledger
            .debit(OperationId::new(), &bob, &Asset::Native, Amount::new(200))
            .await
            .unwrap();
        ledger.settle(&debit).await;
        let _ = ledger
            .credit(OperationId::new(), &bob, &Asset::Native, Amount::new(500))
            .await;

        let total = ledger.total_native_held().await;
        assert_eq!(native_sum(&ledger).await, total);
        assert!(total <= ledger.bank_cap());
        assert_eq!(ledger.accounts().await, vec![alice(), bob]);
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let ledger = Ledger::new(Amount::new(1_000));
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(70))
            .await
            .unwrap();
        ledger
            .credit(OperationId::new(), &alice(), &usdc(), Amount::new(9))
            .await
            .unwrap();

        let json = serde_json::to_string(&ledger.snapshot().await).unwrap();
        let restored = Ledger::restore(
            LedgerLimits::new(Amount::new(1_000)),
            serde_json::from_str(&json).unwrap(),
        );

        assert_eq!(restored.balance(&alice(), &Asset::Native).await, Amount::new(70));
        assert_eq!(restored.balance(&alice(), &usdc()).await, Amount::new(9));
        assert_eq!(restored.counters().await, ledger.counters().await);
        assert_eq!(restored.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsettled_debit_keeps_cap_headroom() {
        let ledger = Ledger::new(Amount::new(100));
        let bob = AccountId::new("bob");
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(100))
            .await
            .unwrap();

        let debit = ledger
            .debit(OperationId::new(), &alice(), &Asset::Native, Amount::new(60))
            .await
            .unwrap();
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::new(40));
        assert_eq!(ledger.total_native_held().await, Amount::new(100));

        let err = ledger
            .credit(OperationId::new(), &bob, &Asset::Native, Amount::new(60))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CAPACITY_EXCEEDED");

        ledger.reverse(&debit).await.unwrap();
        assert_eq!(ledger.balance(&alice(), &Asset::Native).await, Amount::new(100));
        assert_eq!(ledger.total_native_held().await, Amount::new(100));
        assert!(ledger.total_native_held().await <= ledger.bank_cap());
    }

    #[tokio::test]
    async fn test_settle_frees_headroom_once() {
        let ledger = Ledger::new(Amount::new(100));
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(100))
            .await
            .unwrap();
        let debit = ledger
            .debit(OperationId::new(), &alice(), &Asset::Native, Amount::new(60))
            .await
            .unwrap();

        ledger.settle(&debit).await;
        ledger.settle(&debit).await;
        assert_eq!(ledger.total_native_held().await, Amount::new(40));
        assert_eq!(native_sum(&ledger).await, Amount::new(40));

        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(50))
            .await
            .unwrap();
        // the headroom is taken again, so the settled debit cannot come back
        let err = ledger.reverse(&debit).await.unwrap_err();
        assert_eq!(err.error_code(), "CAPACITY_EXCEEDED");
        assert_eq!(ledger.total_native_held().await, Amount::new(90));
    }

    #[tokio::test]
    async fn test_snapshot_counts_unsettled_debits_as_gone() {
        let ledger = Ledger::new(Amount::new(1_000));
        ledger
            .credit(OperationId::new(), &alice(), &Asset::Native, Amount::new(80))
            .await
            .unwrap();
        ledger
            .debit(OperationId::new(), &alice(), &Asset::Native, Amount::new(30))
            .await
            .unwrap();

        let snapshot = ledger.snapshot().await;
        assert_eq!(snapshot.counters.total_native_held, Amount::new(50));
        assert_eq!(ledger.total_native_held().await, Amount::new(80));
    }

    #[tokio::test]
    async fn test_journal_keeps_most_recent_entries() {
        let ledger = Ledger::with_limits(LedgerLimits {
            journal_capacity: 3,
            ..LedgerLimits::new(Amount::new(1_000))
        });
        for amount in 1..=5u128 {
            ledger
                .credit(OperationId::new(), &alice(), &usdc(), Amount::new(amount))
                .await
                .unwrap();
        }

        assert_eq!(ledger.entry_count().await, 3);
        let recent = ledger.recent_entries(10).await;
        assert_eq!(recent[0].amount, Amount::new(5));
        assert_eq!(recent[2].amount, Amount::new(3));
        assert_eq!(ledger.deposit_count().await, 5);
        assert_eq!(ledger.balance(&alice(), &usdc()).await, Amount::new(15));
    }

    #[tokio::test]
    async fn test_operation_ids_forgotten_past_retention() {
        let ledger = Ledger::with_limits(LedgerLimits {
            operation_retention: 2,
            ..LedgerLimits::new(Amount::new(1_000))
        });
        let first = OperationId::new();
        ledger.credit(first, &alice(), &usdc(), Amount::new(1)).await.unwrap();
        let second = OperationId::new();
        ledger.credit(second, &alice(), &usdc(), Amount::new(1)).await.unwrap();
        assert!(ledger.is_applied(&first).await);

        ledger
            .credit(OperationId::new(), &alice(), &usdc(), Amount::new(1))
            .await
            .unwrap();
        assert!(!ledger.is_applied(&first).await);
        assert!(ledger.is_applied(&second).await);
    }
}
