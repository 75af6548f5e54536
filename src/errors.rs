use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Errors raised by the warning feed pipeline and the poller controls.
///
/// `Config` is fatal at construction. The feed errors (`Fetch`,
/// `ProtocolMismatch`, `Parse`) abandon a single poll cycle only.
#[derive(Debug, thiserror::Error)]
pub enum WarnError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch failed{}: {message}", status_suffix(.status))]
    Fetch {
        status: Option<u16>,
        message: String,
    },

    #[error("Response does not match the warning feed envelope: {body:?}")]
    ProtocolMismatch { body: String },

    #[error("Cannot parse warning feed: {message}; payload: {payload:?}")]
    Parse { message: String, payload: String },

    #[error("Poller is already active")]
    AlreadyActive,

    #[error("Poller is not active")]
    NotActive,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ExternalServiceError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<WarnError> for AppError {
    fn from(err: WarnError) -> Self {
        match err {
            WarnError::AlreadyActive | WarnError::NotActive => AppError::Conflict(err.to_string()),
            WarnError::Fetch { .. } | WarnError::ProtocolMismatch { .. } | WarnError::Parse { .. } => {
                AppError::ExternalServiceError(err.to_string())
            }
            WarnError::Config(_) => AppError::InternalError(err.to_string()),
        }
    }
}
