//! Emergency recovery of funds held by the custodian as a whole
//!
//! Recovery bypasses per-account balances entirely. It moves custody funds to
//! a destination without touching the ledger, so it is meant for stuck or
//! mis-sent funds only, and it keeps working while the vault is paused.

use std::sync::Arc;

use custodia_access::AccessRegistry;
use custodia_policy::check_non_zero;
use custodia_types::{AccountId, Amount, Asset, Result, Role, TokenRef, ValidationError};
use tracing::warn;

use crate::transfer::TransferService;

#[derive(Clone)]
pub struct EmergencyRecovery {
    access: AccessRegistry,
    transfers: Arc<dyn TransferService>,
    token: TokenRef,
}

impl EmergencyRecovery {
    pub fn new(
        access: AccessRegistry,
        transfers: Arc<dyn TransferService>,
        token: TokenRef,
    ) -> Self {
        Self {
            access,
            transfers,
            token,
        }
    }

    /// Move `amount` of `asset` from custody to `destination`; returns the amount moved.
    ///
    /// A native amount of zero means the entire externally-held native balance.
    pub async fn recover(
        &self,
        admin: &AccountId,
        asset: &Asset,
        amount: Amount,
        destination: &AccountId,
    ) -> Result<Amount> {
        self.access.ensure_role(admin, Role::Admin).await?;
        if destination.is_null() {
            return Err(ValidationError::InvalidDestination.into());
        }
        if let Asset::Token(token) = asset {
            if *token != self.token {
                return Err(ValidationError::UnsupportedAsset {
                    asset: asset.to_string(),
                }
                .into());
            }
        }

        let amount = match asset {
            Asset::Native if amount.is_zero() => self.transfers.held_balance(asset).await?,
            _ => amount,
        };
        check_non_zero(amount)?;

        self.transfers.release(destination, asset, amount).await?;

        warn!(%admin, %asset, %amount, %destination, "Emergency withdrawal executed");
        Ok(amount)
    }
}
