//! Roles gating vault operations

use serde::{Deserialize, Serialize};
use std::fmt;

/// A role an account may hold
///
/// Admin is the bootstrap role: it is granted to the initializer and is the
/// only role allowed to grant/revoke roles, edit the allow-list, toggle the
/// pause switch and run emergency recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Depositor,
    Withdrawer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Depositor, Role::Withdrawer, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Depositor => "depositor",
            Role::Withdrawer => "withdrawer",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}
