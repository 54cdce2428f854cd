//! Error types for sift-rv
//!
//! Every domain error maps to a distinct, stable error code at the API
//! boundary so that consumers can branch on kind. The exhausted review queue
//! is deliberately not represented here: it is a sentinel result, not an
//! error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sift_common::models::ReviewState;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown document id (400)
    #[error("Unknown document id: {0}")]
    InvalidDocument(i64),

    /// Operation not valid in the current review state (400)
    #[error("Operation '{operation}' not valid in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: ReviewState,
    },

    /// Start precondition unmet (400)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Trainer cannot fit a model from the current labels (400)
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Database operation error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// sift-common error (500)
    #[error("Common error: {0}")]
    Common(#[from] sift_common::Error),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::InvalidDocument(doc_id) => (
                StatusCode::BAD_REQUEST,
                "INVALID_DOCUMENT",
                format!("unknown document id: {}", doc_id),
            ),
            ApiError::InvalidState { operation, state } => (
                StatusCode::BAD_REQUEST,
                "INVALID_STATE",
                format!("operation '{}' not valid in state '{}'", operation, state),
            ),
            ApiError::Precondition(msg) => {
                (StatusCode::BAD_REQUEST, "PRECONDITION_FAILED", msg)
            }
            ApiError::InsufficientData(msg) => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_DATA", msg)
            }
            ApiError::Database(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
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
