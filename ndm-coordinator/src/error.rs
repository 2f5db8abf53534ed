//! Error types for ndm-coordinator
//!
//! [`CoordinatorError`] is the coordinator's failure taxonomy. Per-item remote
//! failures are not errors at this level: they are recorded in the ledger and
//! collected into a `BatchOutcome`, and a rejected API key ends the batch
//! with an `Aborted` status. [`ApiError`] maps the rest onto HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::MigrationState;

/// Coordinator-level failures
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Catalog unreadable (missing, locked, or schema mismatch); the caller may retry
    #[error("Source catalog unavailable: {0}")]
    SourceUnavailable(String),

    /// Status ledger unreadable or unwritable; nothing further is recorded
    #[error("Status ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Another batch holds the run guard
    #[error("A batch is already in progress")]
    BatchInProgress,

    /// Write would move a record backwards through the state machine
    #[error("Invalid state transition for '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MigrationState,
        to: MigrationState,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub(crate) fn source_unavailable(err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable(err.to_string())
    }

    pub(crate) fn ledger_unavailable(err: impl std::fmt::Display) -> Self {
        Self::LedgerUnavailable(err.to_string())
    }
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., batch already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Catalog or ledger unavailable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let message = err.to_string();
        match err {
            CoordinatorError::SourceUnavailable(_) | CoordinatorError::LedgerUnavailable(_) => {
                ApiError::Unavailable(message)
            }
            CoordinatorError::BatchInProgress | CoordinatorError::InvalidTransition { .. } => {
                ApiError::Conflict(message)
            }
            CoordinatorError::NotFound(_) => ApiError::NotFound(message),
            CoordinatorError::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
