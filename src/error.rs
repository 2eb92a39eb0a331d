use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure surfaced at the relay boundary.  Validation and auth errors
/// terminate before any outbound call; upstream errors forward the partner or
/// provider message and are never retried.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing required fields: {0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
    #[error("Phone calls are disabled")]
    CallsDisabled,
    #[error("An unexpected error occurred")]
    Internal(String),
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        RelayError::Internal(e.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, label) = match &self {
            RelayError::Validation(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            RelayError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            RelayError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            RelayError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            RelayError::CallsDisabled => (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"),
            RelayError::Internal(detail) => {
                error!(detail = %detail, "unexpected relay error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        let body = Json(json!({
            "error": label,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
