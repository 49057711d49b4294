//! Notifications emitted by committed vault operations
//!
//! Events are broadcast to subscribers and kept in a bounded in-memory log.
//! Rolled-back operations never emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount, Asset, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultEvent {
    Deposit {
        account: AccountId,
        asset: Asset,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    Withdrawal {
        account: AccountId,
        asset: Asset,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    Whitelisted {
        account: AccountId,
        timestamp: DateTime<Utc>,
    },

    RemovedFromWhitelist {
        account: AccountId,
        timestamp: DateTime<Utc>,
    },

    RoleGranted {
        account: AccountId,
        role: Role,
        granted_by: AccountId,
        timestamp: DateTime<Utc>,
    },

    RoleRevoked {
        account: AccountId,
        role: Role,
        revoked_by: AccountId,
        timestamp: DateTime<Utc>,
    },

    Paused {
        by: AccountId,
        timestamp: DateTime<Utc>,
    },

    Unpaused {
        by: AccountId,
        timestamp: DateTime<Utc>,
    },

    EmergencyWithdrawal {
        admin: AccountId,
        asset: Asset,
        amount: Amount,
        destination: AccountId,
        timestamp: DateTime<Utc>,
    },
}

impl VaultEvent {
    /// Event name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "Deposit",
            Self::Withdrawal { .. } => "Withdrawal",
            Self::Whitelisted { .. } => "Whitelisted",
            Self::RemovedFromWhitelist { .. } => "RemovedFromWhitelist",
            Self::RoleGranted { .. } => "RoleGranted",
            Self::RoleRevoked { .. } => "RoleRevoked",
            Self::Paused { .. } => "Paused",
            Self::Unpaused { .. } => "Unpaused",
            Self::EmergencyWithdrawal { .. } => "EmergencyWithdrawal",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Deposit { timestamp, .. }
            | Self::Withdrawal { timestamp, .. }
            | Self::Whitelisted { timestamp, .. }
            | Self::RemovedFromWhitelist { timestamp, .. }
            | Self::RoleGranted { timestamp, .. }
            | Self::RoleRevoked { timestamp, .. }
            | Self::Paused { timestamp, .. }
            | Self::Unpaused { timestamp, .. }
            | Self::EmergencyWithdrawal { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_matches_name() {
        let event = VaultEvent::Whitelisted {
            account: AccountId::new("alice"),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
    }
}
