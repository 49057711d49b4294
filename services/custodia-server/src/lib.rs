//! Custodia HTTP service
//!
//! One route per vault operation. The caller is named by the
//! `x-custodia-account` header; the hosting environment authenticates it.
//!
//! ```text
//! /v1/
//! ├── deposit, deposit_token, withdraw, withdraw_token   (POST, caller)
//! ├── admin/{whitelist, roles, pause, unpause,
//! │          emergency_withdraw}                         (admin caller)
//! ├── balance/:account, entries/:account                 (GET)
//! ├── price, price/usd?amount=, stats, events            (GET)
//! └── sim/{fund, approve, wallet/:account}               (local settlement)
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::{ApiError, ApiResult};
pub use extractors::{Caller, CALLER_HEADER};
pub use state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Operations
        .route("/v1/deposit", post(handlers::deposit))
        .route("/v1/deposit_token", post(handlers::deposit_token))
        .route("/v1/withdraw", post(handlers::withdraw))
        .route("/v1/withdraw_token", post(handlers::withdraw_token))
        // Administration
        .route("/v1/admin/whitelist", post(handlers::add_to_whitelist))
        .route(
            "/v1/admin/whitelist/:account",
            delete(handlers::remove_from_whitelist),
        )
        .route(
            "/v1/admin/roles",
            post(handlers::grant_role).delete(handlers::revoke_role),
        )
        .route("/v1/admin/pause", post(handlers::pause))
        .route("/v1/admin/unpause", post(handlers::unpause))
        .route(
            "/v1/admin/emergency_withdraw",
            post(handlers::emergency_withdraw),
        )
        // Queries
        .route("/v1/balance/:account", get(handlers::get_balance))
        .route("/v1/entries/:account", get(handlers::get_entries))
        .route("/v1/price", get(handlers::get_price))
        .route("/v1/price/usd", get(handlers::get_usd_value))
        .route("/v1/stats", get(handlers::get_stats))
        .route("/v1/events", get(handlers::get_events))
        // Simulated settlement environment
        .route("/v1/sim/fund", post(handlers::sim_fund))
        .route("/v1/sim/approve", post(handlers::sim_approve))
        .route("/v1/sim/wallet/:account", get(handlers::sim_wallet))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
