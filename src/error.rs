//! Crate-wide error type for the API boundary.
//!
//! Internal engines propagate `anyhow::Result` (see `risk.rs`, `grid/`), matching
//! the rest of the codebase. `AppError` exists only where a typed error is needed
//! to pick an HTTP status and a `{status, message, data}` envelope: at the edge of
//! `api/routes.rs`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// The four error kinds from the design: each carries a distinct propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// User input failed range/format validation. No side effects occurred.
    #[error("validation error: {0}")]
    Validation(String),

    /// A broker RPC, data source call, or other external dependency timed out or
    /// was temporarily unavailable. The caller already retried up to the bound.
    #[error("transient error: {0}")]
    Transient(String),

    /// Lock timeout, stale version, or missing referent. State is unchanged.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Persistent store unavailable, broker auth failure. Auto-trading should be
    /// disabled by the caller; this variant only carries the message upward.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// Caught-all for unexpected failures, generally from `anyhow` propagation.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Consistency(_) => StatusCode::CONFLICT,
            AppError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
