//! Custodia Server
//!
//! Runs the vault behind an HTTP API with an in-process settlement
//! environment.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! custodia-server
//!
//! # Start with custom config
//! custodia-server --config /path/to/config.toml
//!
//! # Start with environment overrides
//! CUSTODIA__SERVER__PORT=8080 custodia-server
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use custodia_oracle::{HttpPriceFeed, PriceFeed, PriceOracleAdapter, StaticPriceFeed};
use custodia_server::config::{LoggingConfig, OracleSettings, ServerConfig};
use custodia_server::{create_router, AppState};
use custodia_types::{AccountId, AssetKind};
use custodia_vault::{InMemoryTransferService, SettlementSnapshot, Vault, VaultSnapshot};
use serde::{Deserialize, Serialize};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Custodia Server - custodial balance vault
#[derive(Parser, Debug)]
#[command(name = "custodia-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "CUSTODIA_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "CUSTODIA_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CUSTODIA_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CUSTODIA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "CUSTODIA_LOG_FORMAT")]
    log_format: Option<String>,

    /// Bootstrap admin account for a fresh vault
    #[arg(long, env = "CUSTODIA_ADMIN")]
    admin: Option<String>,

    /// State file loaded at startup and written at shutdown
    #[arg(long, env = "CUSTODIA_STATE_PATH")]
    state_path: Option<std::path::PathBuf>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;

    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }
    if let Some(admin) = args.admin {
        server_config.vault.admin = admin;
    }
    if let Some(path) = args.state_path {
        server_config.persistence.state_path = Some(path);
    }
    server_config.validate()?;

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Custodia Server"
    );

    let (vault, transfers) = init_vault(&server_config).await?;
    let vault = Arc::new(vault);
    let state = Arc::new(AppState::new(vault.clone(), transfers.clone()));

    let app = create_router(state, server_config.server.enable_cors);

    let addr = server_config.server.socket_addr()?;
    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    if let Some(path) = &server_config.persistence.state_path {
        save_state(&vault, &transfers, path).await?;
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    Ok(())
}

/// Everything written to the state file
///
/// The local settlement books travel with the vault so custody still backs
/// the restored balances.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    vault: VaultSnapshot,
    settlement: SettlementSnapshot,
}

/// Restore the vault and its settlement books from the state file, or create fresh ones
async fn init_vault(config: &ServerConfig) -> anyhow::Result<(Vault, InMemoryTransferService)> {
    let persisted = match &config.persistence.state_path {
        Some(path) if path.exists() => Some(load_state(path).await?),
        _ => None,
    };

    let (vault, transfers) = match persisted {
        Some(PersistedState { vault, settlement }) => {
            if vault.config != config.vault.limits {
                tracing::warn!(
                    "Snapshot vault limits differ from configuration; keeping the snapshot's"
                );
            }
            let counters = vault.ledger.counters;
            for (kind, owed) in [
                (AssetKind::Native, counters.total_native_held),
                (AssetKind::Token, counters.total_token_held),
            ] {
                let held = settlement.custody(kind);
                if held < owed {
                    tracing::warn!(%kind, %held, %owed, "Custody does not cover ledger balances");
                }
            }
            tracing::info!(
                balances = vault.ledger.balances.len(),
                paused = ?vault.pause,
                "Restoring vault from snapshot"
            );
            let transfers = InMemoryTransferService::restore(settlement);
            let vault = Vault::restore(vault, Arc::new(transfers.clone()))?;
            (vault, transfers)
        }
        None => {
            tracing::info!(admin = %config.vault.admin, "Creating empty vault");
            let transfers = InMemoryTransferService::new();
            let vault = Vault::new(
                config.vault.limits.clone(),
                AccountId::new(&config.vault.admin),
                Arc::new(transfers.clone()),
            )?;
            (vault, transfers)
        }
    };

    let staleness = vault.config().oracle_max_staleness();
    let vault = match init_price_feed(&config.oracle)? {
        Some(feed) => {
            tracing::info!(feed = feed.description(), "Price feed configured");
            vault.with_oracle(PriceOracleAdapter::new(feed, staleness))
        }
        None => {
            tracing::warn!("No price feed configured; pricing queries will fail");
            vault
        }
    };
    Ok((vault, transfers))
}

fn init_price_feed(settings: &OracleSettings) -> anyhow::Result<Option<Arc<dyn PriceFeed>>> {
    if let Some(url) = &settings.url {
        let feed = HttpPriceFeed::new(&settings.description, url, settings.request_timeout())
            .map_err(|e| anyhow::anyhow!("failed to build price feed client: {}", e))?;
        return Ok(Some(Arc::new(feed)));
    }
    Ok(settings.static_price.map(|price| {
        Arc::new(StaticPriceFeed::with_price(&settings.description, price as i128))
            as Arc<dyn PriceFeed>
    }))
}

async fn load_state(path: &Path) -> anyhow::Result<PersistedState> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading state file {}", path.display()))?;
    let state = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing state file {}", path.display()))?;
    Ok(state)
}

async fn save_state(
    vault: &Vault,
    transfers: &InMemoryTransferService,
    path: &Path,
) -> anyhow::Result<()> {
    let state = PersistedState {
        vault: vault.snapshot().await,
        settlement: transfers.snapshot().await,
    };
    let json = serde_json::to_vec_pretty(&state)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing state file {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::info!(path = %path.display(), "Vault state saved");
    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );

    tokio::time::sleep(timeout).await;
}

// =============================================================================
// Tests
// =============================================================================
