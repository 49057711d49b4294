//! Request extractors

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use custodia_types::AccountId;

use crate::error::ApiError;

/// Header carrying the caller's account; the hosting environment authenticates it
pub const CALLER_HEADER: &str = "x-custodia-account";

/// The account on whose behalf a request is made
#[derive(Debug, Clone)]
pub struct Caller(pub AccountId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(AccountId::new)
            .filter(|account| !account.is_null())
            .map(Caller)
            .ok_or(ApiError::MissingCaller)
    }
}
