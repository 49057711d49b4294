//! External transfer collaborator
//!
//! The environment that actually moves value is outside the vault. The vault
//! only needs three things from it: take funds from an account into custody,
//! release funds from custody to an account, and report what custody holds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use custodia_types::{AccountId, Amount, Asset, AssetKind, ExternalError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub type TransferResult<T> = std::result::Result<T, ExternalError>;

/// Moves value between accounts and the custodian
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Move `amount` from `from` into custody.
    ///
    /// For the native asset this settles the value attached to the call; for
    /// the token it draws on an approval previously given by `from`.
    async fn pull(&self, from: &AccountId, asset: &Asset, amount: Amount) -> TransferResult<()>;

    /// Move `amount` out of custody to `to`
    async fn release(&self, to: &AccountId, asset: &Asset, amount: Amount) -> TransferResult<()>;

    /// Total amount of `asset` the custodian holds externally
    async fn held_balance(&self, asset: &Asset) -> TransferResult<Amount>;
}

/// External wallet balance of one account in one asset class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub account: AccountId,
    pub kind: AssetKind,
    pub amount: Amount,
}

/// Token amount the custodian may still pull from `owner`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceRecord {
    pub owner: AccountId,
    pub amount: Amount,
}

/// Amount of an asset class held in custody
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub kind: AssetKind,
    pub amount: Amount,
}

/// Durable state of an [`InMemoryTransferService`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    pub wallets: Vec<WalletRecord>,
    pub allowances: Vec<AllowanceRecord>,
    pub custody: Vec<CustodyRecord>,
}

impl SettlementSnapshot {
    pub fn custody(&self, kind: AssetKind) -> Amount {
        self.custody
            .iter()
            .find(|record| record.kind == kind)
            .map(|record| record.amount)
            .unwrap_or(Amount::zero())
    }
}

#[derive(Debug, Default)]
struct Books {
    wallets: HashMap<(AccountId, AssetKind), Amount>,
    allowances: HashMap<AccountId, Amount>,
    custody: HashMap<AssetKind, Amount>,
}

impl Books {
    fn wallet(&self, account: &AccountId, kind: AssetKind) -> Amount {
        self.wallets
            .get(&(account.clone(), kind))
            .copied()
            .unwrap_or(Amount::zero())
    }

    fn custody(&self, kind: AssetKind) -> Amount {
        self.custody.get(&kind).copied().unwrap_or(Amount::zero())
    }
}

/// In-process transfer service with external wallets and token approvals
///
/// Used by the service's local mode and by tests. Failures can be injected
/// per direction.
#[derive(Clone, Default)]
pub struct InMemoryTransferService {
    books: Arc<RwLock<Books>>,
    fail_pulls: Arc<AtomicBool>,
    fail_releases: Arc<AtomicBool>,
    pulls: Arc<AtomicU64>,
    releases: Arc<AtomicU64>,
}

impl InMemoryTransferService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the service from saved books
    pub fn restore(snapshot: SettlementSnapshot) -> Self {
        let mut books = Books::default();
        for record in snapshot.wallets {
            books.wallets.insert((record.account, record.kind), record.amount);
        }
        for record in snapshot.allowances {
            books.allowances.insert(record.owner, record.amount);
        }
        for record in snapshot.custody {
            books.custody.insert(record.kind, record.amount);
        }
        Self {
            books: Arc::new(RwLock::new(books)),
            ..Self::default()
        }
    }

    pub async fn snapshot(&self) -> SettlementSnapshot {
        let books = self.books.read().await;
        let mut wallets: Vec<WalletRecord> = books
            .wallets
            .iter()
            .map(|((account, kind), amount)| WalletRecord {
                account: account.clone(),
                kind: *kind,
                amount: *amount,
            })
            .collect();
        wallets.sort_by(|a, b| {
            a.account
                .cmp(&b.account)
                .then_with(|| (a.kind == AssetKind::Token).cmp(&(b.kind == AssetKind::Token)))
        });
        let mut allowances: Vec<AllowanceRecord> = books
            .allowances
            .iter()
            .map(|(owner, amount)| AllowanceRecord {
                owner: owner.clone(),
                amount: *amount,
            })
            .collect();
        allowances.sort_by(|a, b| a.owner.cmp(&b.owner));
        let custody = [AssetKind::Native, AssetKind::Token]
            .into_iter()
            .map(|kind| CustodyRecord {
                kind,
                amount: books.custody(kind),
            })
            .collect();
        SettlementSnapshot {
            wallets,
            allowances,
            custody,
        }
    }

    /// Credit an external wallet, e.g. to simulate funds arriving from elsewhere
    pub async fn fund(
        &self,
        account: &AccountId,
        kind: AssetKind,
        amount: Amount,
    ) -> TransferResult<Amount> {
        let mut books = self.books.write().await;
        let new_balance = books
            .wallet(account, kind)
            .checked_add(amount)
            .ok_or_else(|| ExternalError::transfer_failed("wallet balance overflow"))?;
        books.wallets.insert((account.clone(), kind), new_balance);
        debug!(%account, %kind, %amount, "External wallet funded");
        Ok(new_balance)
    }

    /// Set the token amount the custodian may pull from `owner`
    pub async fn approve(&self, owner: &AccountId, amount: Amount) {
        self.books
            .write()
            .await
            .allowances
            .insert(owner.clone(), amount);
        debug!(%owner, %amount, "Token allowance set");
    }

    /// Add funds straight to custody without a ledger entry (mis-sent funds)
    pub async fn seed_custody(&self, kind: AssetKind, amount: Amount) {
        let mut books = self.books.write().await;
        let held = books.custody(kind).checked_add(amount).unwrap_or(Amount::new(u128::MAX));
        books.custody.insert(kind, held);
    }

    pub async fn wallet_balance(&self, account: &AccountId, kind: AssetKind) -> Amount {
        self.books.read().await.wallet(account, kind)
    }

    pub async fn allowance(&self, owner: &AccountId) -> Amount {
        self.books
            .read()
            .await
            .allowances
            .get(owner)
            .copied()
            .unwrap_or(Amount::zero())
    }

    pub fn set_fail_pulls(&self, fail: bool) {
        self.fail_pulls.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }

    /// Number of successful pulls
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Number of successful releases
    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferService for InMemoryTransferService {
    async fn pull(&self, from: &AccountId, asset: &Asset, amount: Amount) -> TransferResult<()> {
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(ExternalError::transfer_failed("pull rejected by transfer service"));
        }

        let kind = asset.kind();
        let mut books = self.books.write().await;

        let available = books.wallet(from, kind);
        let remaining = available.checked_sub(amount).ok_or_else(|| {
            ExternalError::transfer_failed(format!(
                "{} holds {} {}, needs {}",
                from, available, kind, amount
            ))
        })?;

        let new_allowance = if kind == AssetKind::Token {
            let allowance = books.allowances.get(from).copied().unwrap_or(Amount::zero());
            Some(allowance.checked_sub(amount).ok_or_else(|| {
                ExternalError::transfer_failed(format!(
                    "allowance {} of {} is below {}",
                    allowance, from, amount
                ))
            })?)
        } else {
            None
        };

        let held = books
            .custody(kind)
            .checked_add(amount)
            .ok_or_else(|| ExternalError::transfer_failed("custody balance overflow"))?;

        books.wallets.insert((from.clone(), kind), remaining);
        if let Some(allowance) = new_allowance {
            books.allowances.insert(from.clone(), allowance);
        }
        books.custody.insert(kind, held);
        self.pulls.fetch_add(1, Ordering::SeqCst);

        info!(%from, %asset, %amount, "Funds pulled into custody");
        Ok(())
    }

    async fn release(&self, to: &AccountId, asset: &Asset, amount: Amount) -> TransferResult<()> {
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(ExternalError::transfer_failed("release rejected by transfer service"));
        }

        let kind = asset.kind();
        let mut books = self.books.write().await;

        let held = books.custody(kind);
        let remaining = held.checked_sub(amount).ok_or_else(|| {
            ExternalError::transfer_failed(format!(
                "custody holds {} {}, needs {}",
                held, kind, amount
            ))
        })?;
        let new_wallet = books
            .wallet(to, kind)
            .checked_add(amount)
            .ok_or_else(|| ExternalError::transfer_failed("wallet balance overflow"))?;

        books.custody.insert(kind, remaining);
        books.wallets.insert((to.clone(), kind), new_wallet);
        self.releases.fetch_add(1, Ordering::SeqCst);

        info!(%to, %asset, %amount, "Funds released from custody");
        Ok(())
    }

    async fn held_balance(&self, asset: &Asset) -> TransferResult<Amount> {
        Ok(self.books.read().await.custody(asset.kind()))
    }
}
