//! Route handlers
//!
//! Mutating routes act on behalf of the [`Caller`]; queries are open.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use custodia_oracle::PriceQuote;
use custodia_types::{AccountId, Amount, AssetKind, OperationId, Role, VaultEvent};
use custodia_vault::OperationReceipt;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extractors::Caller;
use crate::state::AppState;

type AppStateRef = State<Arc<AppState>>;

// ============================================================================
// Root Handlers
// ============================================================================

pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Custodia",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Custodial balance vault for native and token assets",
        "endpoints": {
            "operations": {
                "deposit": "POST /v1/deposit",
                "deposit_token": "POST /v1/deposit_token",
                "withdraw": "POST /v1/withdraw",
                "withdraw_token": "POST /v1/withdraw_token"
            },
            "admin": {
                "whitelist": "POST /v1/admin/whitelist, DELETE /v1/admin/whitelist/:account",
                "roles": "POST/DELETE /v1/admin/roles",
                "pause": "POST /v1/admin/pause",
                "unpause": "POST /v1/admin/unpause",
                "emergency_withdraw": "POST /v1/admin/emergency_withdraw"
            },
            "queries": {
                "balance": "GET /v1/balance/:account",
                "entries": "GET /v1/entries/:account",
                "price": "GET /v1/price",
                "usd": "GET /v1/price/usd?amount=",
                "stats": "GET /v1/stats",
                "events": "GET /v1/events?limit="
            }
        }
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy"}))
}

// ============================================================================
// Deposit & Withdrawal Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct TokenDepositRequest {
    pub amount: Amount,
    /// Reuse on retry so the tokens are pulled at most once
    pub operation_id: Option<String>,
}

pub async fn deposit(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<OperationReceipt>> {
    let receipt = state.vault.deposit_native(&caller, req.amount).await?;
    Ok(Json(receipt))
}

pub async fn deposit_token(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<TokenDepositRequest>,
) -> ApiResult<Json<OperationReceipt>> {
    let operation_id = req
        .operation_id
        .as_deref()
        .map(OperationId::parse)
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("invalid operation_id: {}", e)))?;

    let receipt = state
        .vault
        .deposit_token(&caller, req.amount, operation_id)
        .await?;
    Ok(Json(receipt))
}

pub async fn withdraw(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<OperationReceipt>> {
    let receipt = state.vault.withdraw_native(&caller, req.amount).await?;
    Ok(Json(receipt))
}

pub async fn withdraw_token(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<AmountRequest>,
) -> ApiResult<Json<OperationReceipt>> {
    let receipt = state.vault.withdraw_token(&caller, req.amount).await?;
    Ok(Json(receipt))
}

// ============================================================================
// Admin Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AccountRequest {
    pub account: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub account: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ChangeResponse {
    pub account: String,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub paused: bool,
}

pub async fn add_to_whitelist(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<AccountRequest>,
) -> ApiResult<Json<ChangeResponse>> {
    let changed = state
        .vault
        .add_to_whitelist(&caller, &AccountId::new(&req.account))
        .await?;
    Ok(Json(ChangeResponse {
        account: req.account,
        changed,
    }))
}

pub async fn remove_from_whitelist(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Path(account): Path<String>,
) -> ApiResult<Json<ChangeResponse>> {
    let changed = state
        .vault
        .remove_from_whitelist(&caller, &AccountId::new(&account))
        .await?;
    Ok(Json(ChangeResponse { account, changed }))
}

pub async fn grant_role(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<ChangeResponse>> {
    let changed = state
        .vault
        .grant_role(&caller, &AccountId::new(&req.account), req.role)
        .await?;
    Ok(Json(ChangeResponse {
        account: req.account,
        changed,
    }))
}

pub async fn revoke_role(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<ChangeResponse>> {
    let changed = state
        .vault
        .revoke_role(&caller, &AccountId::new(&req.account), req.role)
        .await?;
    Ok(Json(ChangeResponse {
        account: req.account,
        changed,
    }))
}

pub async fn pause(
    State(state): AppStateRef,
    Caller(caller): Caller,
) -> ApiResult<Json<PauseResponse>> {
    state.vault.pause(&caller).await?;
    Ok(Json(PauseResponse { paused: true }))
}

pub async fn unpause(
    State(state): AppStateRef,
    Caller(caller): Caller,
) -> ApiResult<Json<PauseResponse>> {
    state.vault.unpause(&caller).await?;
    Ok(Json(PauseResponse { paused: false }))
}

#[derive(Debug, Deserialize)]
pub struct EmergencyWithdrawRequest {
    pub asset: AssetKind,
    /// Zero with the native asset recovers the entire custody balance
    pub amount: Amount,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct EmergencyWithdrawResponse {
    pub asset: AssetKind,
    pub amount: Amount,
    pub destination: String,
}

pub async fn emergency_withdraw(
    State(state): AppStateRef,
    Caller(caller): Caller,
    Json(req): Json<EmergencyWithdrawRequest>,
) -> ApiResult<Json<EmergencyWithdrawResponse>> {
    let asset = state.vault.asset(req.asset);
    let moved = state
        .vault
        .emergency_withdraw(&caller, &asset, req.amount, &AccountId::new(&req.destination))
        .await?;
    Ok(Json(EmergencyWithdrawResponse {
        asset: req.asset,
        amount: moved,
        destination: req.destination,
    }))
}

// ============================================================================
// Query Handlers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account: String,
    pub native: Amount,
    pub token: Amount,
    pub token_symbol: String,
}

pub async fn get_balance(
    State(state): AppStateRef,
    Path(account): Path<String>,
) -> ApiResult<Json<BalanceResponse>> {
    let id = AccountId::new(&account);
    let native = state.vault.balance(&id, &state.vault.asset(AssetKind::Native)).await?;
    let token = state.vault.balance(&id, &state.vault.token_asset()).await?;
    Ok(Json(BalanceResponse {
        account,
        native,
        token,
        token_symbol: state.vault.config().token.symbol.clone(),
    }))
}

pub async fn get_entries(
    State(state): AppStateRef,
    Path(account): Path<String>,
) -> impl IntoResponse {
    let entries = state.vault.account_entries(&AccountId::new(account)).await;
    Json(serde_json::json!({
        "entries": entries,
        "count": entries.len()
    }))
}

pub async fn get_price(State(state): AppStateRef) -> ApiResult<Json<PriceQuote>> {
    let quote = state.vault.latest_price().await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
pub struct UsdQuery {
    pub amount: Amount,
}

pub async fn get_usd_value(
    State(state): AppStateRef,
    Query(query): Query<UsdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let usd = state.vault.convert_to_usd(query.amount).await?;
    Ok(Json(serde_json::json!({
        "amount": query.amount,
        "usd": usd.0.to_string(),
        "display": usd.to_string(),
    })))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub deposit_count: u64,
    pub withdrawal_count: u64,
    pub total_native_held: Amount,
    pub total_token_held: Amount,
    pub bank_cap: Amount,
    pub paused: bool,
}

pub async fn get_stats(State(state): AppStateRef) -> Json<StatsResponse> {
    let counters = state.vault.counters().await;
    Json(StatsResponse {
        deposit_count: counters.deposit_count,
        withdrawal_count: counters.withdrawal_count,
        total_native_held: counters.total_native_held,
        total_token_held: counters.total_token_held,
        bank_cap: state.vault.config().bank_cap,
        paused: state.vault.is_paused().await,
    })
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_events_limit")]
    pub limit: usize,
}

fn default_events_limit() -> usize {
    50
}

pub async fn get_events(
    State(state): AppStateRef,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<VaultEvent>> {
    Json(state.vault.recent_events(query.limit).await)
}

// ============================================================================
// Simulation Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FundRequest {
    pub account: String,
    pub asset: AssetKind,
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub account: String,
    pub amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub account: String,
    pub native: Amount,
    pub token: Amount,
    pub allowance: Amount,
}

async fn wallet(state: &AppState, account: String) -> WalletResponse {
    let id = AccountId::new(&account);
    WalletResponse {
        native: state.transfers.wallet_balance(&id, AssetKind::Native).await,
        token: state.transfers.wallet_balance(&id, AssetKind::Token).await,
        allowance: state.transfers.allowance(&id).await,
        account,
    }
}

/// Credit an external wallet in the simulated settlement environment
pub async fn sim_fund(
    State(state): AppStateRef,
    Json(req): Json<FundRequest>,
) -> ApiResult<Json<WalletResponse>> {
    state
        .transfers
        .fund(&AccountId::new(&req.account), req.asset, req.amount)
        .await
        .map_err(|e| ApiError::Custody(e.into()))?;
    Ok(Json(wallet(&state, req.account).await))
}

/// Approve the custodian to pull tokens from a simulated wallet
pub async fn sim_approve(
    State(state): AppStateRef,
    Json(req): Json<ApproveRequest>,
) -> Json<WalletResponse> {
    state
        .transfers
        .approve(&AccountId::new(&req.account), req.amount)
        .await;
    Json(wallet(&state, req.account).await)
}

pub async fn sim_wallet(
    State(state): AppStateRef,
    Path(account): Path<String>,
) -> Json<WalletResponse> {
    Json(wallet(&state, account).await)
}
