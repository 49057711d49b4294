//! Server Configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional file
//! named on the command line, `config/default`, `config/local`, then
//! `CUSTODIA__`-prefixed environment variables (`CUSTODIA__SERVER__PORT=8080`).
//! CLI flags are applied last by `main`.
//!
//! Amounts may be written as integers or decimal strings; values beyond the
//! signed 64-bit range must be strings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use custodia_vault::VaultConfig;
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bootstrap admin and vault limits
    #[serde(default)]
    pub vault: VaultSettings,

    /// Price feed
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Snapshot persistence
    #[serde(default)]
    pub persistence: PersistenceSettings,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable permissive CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Vault settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Account granted Admin when the vault starts empty
    #[serde(default = "default_admin")]
    pub admin: String,

    #[serde(default)]
    pub limits: VaultConfig,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            limits: VaultConfig::default(),
        }
    }
}

/// Price feed settings
///
/// `url` selects an HTTP feed; otherwise `static_price` (1e8-scaled) seeds an
/// in-process feed; with neither, pricing queries report the oracle invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    #[serde(default = "default_feed_description")]
    pub description: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub static_price: Option<i64>,

    #[serde(default = "default_feed_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            description: default_feed_description(),
            url: None,
            static_price: None,
            request_timeout_secs: default_feed_timeout(),
        }
    }
}

impl OracleSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Snapshot persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Snapshot file loaded at startup and written at shutdown
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_admin() -> String {
    "admin".to_string()
}

fn default_feed_description() -> String {
    "NATIVE / USD".to_string()
}

fn default_feed_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // Values stay strings so that large amounts are not coerced to floats
        builder = builder.add_source(config::Environment::with_prefix("CUSTODIA").separator("__"));

        let server_config: ServerConfig = builder.build()?.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vault.admin.trim().is_empty() {
            anyhow::bail!("vault.admin must name the bootstrap admin account");
        }
        self.vault.limits.validate()?;
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!("logging.format must be 'json' or 'pretty'");
        }
        if let Some(price) = self.oracle.static_price {
            if price <= 0 {
                anyhow::bail!("oracle.static_price must be positive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.vault.admin, "admin");
        assert!(config.persistence.state_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..ServerSettings::default()
        };
        assert_eq!(settings.socket_addr().unwrap().port(), 8080);

        let bad = ServerSettings {
            host: "not a host".to_string(),
            ..ServerSettings::default()
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.vault.admin = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.oracle.static_price = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_config() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "server": {"port": 9000},
                "vault": {"admin": "ops", "limits": {"bank_cap": "100"}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.vault.admin, "ops");
        assert_eq!(config.vault.limits.bank_cap.value(), 100);
    }
}
