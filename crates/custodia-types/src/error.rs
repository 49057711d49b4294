//! Error taxonomy for Custodia
//!
//! Every failure surfaces as a distinct, inspectable kind. Nothing is retried
//! internally; retries are the caller's decision.

use crate::{AccountId, Amount, Role};
use thiserror::Error;

/// Result type for Custodia operations
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Input or balance checks; detected before any mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Amount must be greater than zero")]
    AmountZero,

    #[error("Capacity exceeded: holding {current}, incoming {incoming}, cap {cap}")]
    CapacityExceeded {
        current: Amount,
        incoming: Amount,
        cap: Amount,
    },

    #[error("Withdrawal of {amount} exceeds per-operation ceiling {ceiling}")]
    WithdrawalCeilingExceeded { amount: Amount, ceiling: Amount },

    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    #[error("Destination must not be the null account")]
    InvalidDestination,

    #[error("Roles and allow-list entries cannot name the null account")]
    InvalidAccount,

    #[error("Asset {asset} is not held by this vault")]
    UnsupportedAsset { asset: String },
}

/// Caller lacks the right to perform the operation; checked before anything else
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("Account {account} does not hold role {role}")]
    MissingRole { account: AccountId, role: Role },

    #[error("Account {account} is not whitelisted")]
    NotWhitelisted { account: AccountId },
}

/// The system is not in a state that allows the operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("Contract is paused")]
    ContractPaused,

    #[error("Contract is not paused")]
    NotPaused,

    #[error("Cannot revoke the last admin ({account})")]
    LastAdmin { account: AccountId },

    #[error("Operation {operation_id} has already been applied")]
    DuplicateOperation { operation_id: String },

    /// A failed operation could not be undone; ledger and custody disagree
    #[error("Rollback of operation {operation_id} failed: {reason}")]
    RollbackFailed {
        operation_id: String,
        reason: String,
    },
}

/// A collaborator outside the ledger failed; any mutation in the call is rolled back
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("External transfer failed: {reason}")]
    TransferFailed { reason: String },

    #[error("Oracle price invalid: {reason}")]
    OraclePriceInvalid { reason: String },
}

impl ExternalError {
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    pub fn oracle_invalid(reason: impl Into<String>) -> Self {
        Self::OraclePriceInvalid {
            reason: reason.into(),
        }
    }
}

/// Coarse classification of a [`CustodyError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    External,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::State => "state",
            Self::External => "external",
        }
    }
}

/// Custodia error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    External(#[from] ExternalError),
}

impl CustodyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::State(_) => ErrorKind::State,
            Self::External(_) => ErrorKind::External,
        }
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => match e {
                ValidationError::AmountZero => "AMOUNT_ZERO",
                ValidationError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
                ValidationError::WithdrawalCeilingExceeded { .. } => {
                    "WITHDRAWAL_CEILING_EXCEEDED"
                }
                ValidationError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
                ValidationError::AmountOverflow => "AMOUNT_OVERFLOW",
                ValidationError::InvalidDestination => "INVALID_DESTINATION",
                ValidationError::InvalidAccount => "INVALID_ACCOUNT",
                ValidationError::UnsupportedAsset { .. } => "UNSUPPORTED_ASSET",
            },
            Self::Authorization(e) => match e {
                AuthorizationError::MissingRole { .. } => "MISSING_ROLE",
                AuthorizationError::NotWhitelisted { .. } => "NOT_WHITELISTED",
            },
            Self::State(e) => match e {
                StateError::ContractPaused => "CONTRACT_PAUSED",
                StateError::NotPaused => "NOT_PAUSED",
                StateError::LastAdmin { .. } => "LAST_ADMIN",
                StateError::DuplicateOperation { .. } => "DUPLICATE_OPERATION",
                StateError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            },
            Self::External(e) => match e {
                ExternalError::TransferFailed { .. } => "TRANSFER_FAILED",
                ExternalError::OraclePriceInvalid { .. } => "ORACLE_PRICE_INVALID",
            },
        }
    }

    pub fn missing_role(account: &AccountId, role: Role) -> Self {
        AuthorizationError::MissingRole {
            account: account.clone(),
            role,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_kinds() {
        let err: CustodyError = ValidationError::InsufficientBalance {
            available: Amount::new(5),
            required: Amount::new(10),
        }
        .into();
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Insufficient balance: have 5, need 10");

        let err = CustodyError::missing_role(&AccountId::new("mallory"), Role::Admin);
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.error_code(), "MISSING_ROLE");

        let err: CustodyError = ExternalError::transfer_failed("rejected").into();
        assert_eq!(err.kind(), ErrorKind::External);

        let err: CustodyError = StateError::RollbackFailed {
            operation_id: "op_1".to_string(),
            reason: "release refused".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(err.error_code(), "ROLLBACK_FAILED");
    }
}
