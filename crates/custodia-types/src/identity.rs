//! Identity types for Custodia
//!
//! Accounts are opaque keys handed to us by the hosting environment. Internal
//! identifiers (operations, journal entries) are prefixed UUIDs so they can
//! never be mixed up with each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of an account holding custodied funds
///
/// The empty identity is the null account: it never owns a balance and is
/// never accepted as a recovery destination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The null account
    pub fn null() -> Self {
        Self(String::new())
    }

    pub fn is_null(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "<null>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Macro to generate prefixed UUID identifier types
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id_type!(OperationId, "op", "Unique identifier of one deposit or withdrawal call");
define_id_type!(EntryId, "entry", "Unique identifier of a journal entry");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_account() {
        assert!(AccountId::null().is_null());
        assert!(AccountId::new("   ").is_null());
        assert!(!AccountId::new("alice").is_null());
        assert_eq!(AccountId::null().to_string(), "<null>");
    }

    #[test]
    fn test_operation_id_parse_accepts_prefix() {
        let id = OperationId::new();
        let parsed = OperationId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(OperationId::parse("op_not-a-uuid").is_err());
    }
}
