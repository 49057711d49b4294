//! Asset types
//!
//! Custodia holds exactly two asset classes: the native unit of value and one
//! fungible token whose custody is mediated by an external transfer service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display decimals of the native asset (1 unit = 1e18 subunits)
pub const NATIVE_DECIMALS: u8 = 18;

/// Reference to the fungible token held by the vault
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenRef {
    /// External reference of the token (contract address, mint, ...)
    pub id: String,
    /// Ticker symbol, display only
    pub symbol: String,
    /// Display/oracle decimals; never used to scale stored balances
    pub decimals: u8,
}

impl TokenRef {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// An asset held in custody
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    /// The base unit of value, received directly with the call
    Native,
    /// The configured fungible token
    Token(TokenRef),
}

impl Asset {
    pub fn token(id: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Asset::Token(TokenRef::new(id, symbol, decimals))
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Native => AssetKind::Native,
            Asset::Token(_) => AssetKind::Token,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Asset::Native => NATIVE_DECIMALS,
            Asset::Token(token) => token.decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Asset::Native => "NATIVE",
            Asset::Token(token) => &token.symbol,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(token) => write!(f, "token:{}", token.symbol),
        }
    }
}

/// Asset class without the token details, as named by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Native,
    Token,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Native => write!(f, "native"),
            AssetKind::Token => write!(f, "token"),
        }
    }
}

impl std::str::FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(AssetKind::Native),
            "token" => Ok(AssetKind::Token),
            other => Err(format!("unknown asset kind '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimals_and_kind() {
        let usdc = Asset::token("0xa0b8", "USDC", 6);
        assert_eq!(usdc.decimals(), 6);
        assert_eq!(usdc.kind(), AssetKind::Token);
        assert_eq!(Asset::Native.decimals(), 18);
        assert!(Asset::Native.is_native());
    }

    #[test]
    fn test_asset_serde_shape() {
        let json = serde_json::to_value(Asset::token("0xa0b8", "USDC", 6)).unwrap();
        assert_eq!(json["kind"], "token");
        assert_eq!(json["symbol"], "USDC");

        let native: Asset = serde_json::from_str(r#"{"kind":"native"}"#).unwrap();
        assert_eq!(native, Asset::Native);
    }

    #[test]
    fn test_asset_kind_from_str() {
        assert_eq!("Native".parse::<AssetKind>().unwrap(), AssetKind::Native);
        assert_eq!("token".parse::<AssetKind>().unwrap(), AssetKind::Token);
        assert!("btc".parse::<AssetKind>().is_err());
    }
}
