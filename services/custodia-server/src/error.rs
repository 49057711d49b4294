//! API error type
//!
//! Vault errors map to HTTP statuses by kind: validation 422, authorization
//! 403, state 409, external 502. A failed rollback is a 500: the vault needs
//! an operator. Every error body has the same shape:
//!
//! ```json
//! { "error": { "code": "CAPACITY_EXCEEDED", "kind": "validation", "message": "..." } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use custodia_types::{CustodyError, ErrorKind, StateError};
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the vault
    Custody(CustodyError),
    /// Request did not name its caller
    MissingCaller,
    /// Malformed request
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Custody(CustodyError::State(StateError::RollbackFailed { .. })) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Custody(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::State => StatusCode::CONFLICT,
                ErrorKind::External => StatusCode::BAD_GATEWAY,
            },
            Self::MissingCaller => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<CustodyError> for ApiError {
    fn from(err: CustodyError) -> Self {
        Self::Custody(err)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        let error = match err {
            ApiError::Custody(e) => ErrorBody {
                code: e.error_code().to_string(),
                kind: e.kind().as_str().to_string(),
                message: e.to_string(),
            },
            ApiError::MissingCaller => ErrorBody {
                code: "MISSING_CALLER".to_string(),
                kind: "request".to_string(),
                message: "x-custodia-account header is required".to_string(),
            },
            ApiError::BadRequest(message) => ErrorBody {
                code: "BAD_REQUEST".to_string(),
                kind: "request".to_string(),
                message: message.clone(),
            },
        };
        Self { error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = ?self, "Request failed");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::ValidationError;

    #[test]
    fn test_status_by_kind() {
        let err = ApiError::from(CustodyError::from(ValidationError::AmountZero));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError::from(CustodyError::from(StateError::ContractPaused));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::MissingCaller.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_failed_rollback_is_server_error() {
        let err = ApiError::from(CustodyError::from(StateError::RollbackFailed {
            operation_id: "op_1".to_string(),
            reason: "release refused".to_string(),
        }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_shape() {
        let err = ApiError::from(CustodyError::from(StateError::ContractPaused));
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["error"]["code"], "CONTRACT_PAUSED");
        assert_eq!(body["error"]["kind"], "state");
        assert_eq!(body["error"]["message"], "Contract is paused");
    }
}
