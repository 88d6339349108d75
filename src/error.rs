use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Business-rule failures each map to a distinct kind so callers can
/// render a precise message. "No courier found" is deliberately absent:
/// that is a `DispatchOutcome`, not an error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DispatchError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DispatchError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            DispatchError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            // Distinct from Conflict so clients can tell "too slow"
            // from "already taken".
            DispatchError::Expired(msg) => (StatusCode::GONE, msg.clone()),
            DispatchError::Unauthorized(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            DispatchError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DispatchError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
