//! Poller HTTP endpoints.
//!
//! GET  /api/v1/poller/status : current state of the background poller.
//! POST /api/v1/poller/refresh: request an immediate poll.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::errors::{AppError, ErrorResponse};
use crate::services::poller::{PollerStatus, WarningPoller};

/// Get the current poller status.
///
/// Returns the active flag, configured location patterns and loop statistics
/// (last accepted document time, poll counters, last error).
#[utoipa::path(
    get,
    path = "/api/v1/poller/status",
    tag = "Poller",
    responses(
        (status = 200, description = "Current poller status", body = PollerStatus),
    )
)]
pub async fn get_poller_status(State(poller): State<WarningPoller>) -> Json<PollerStatus> {
    Json(poller.status().await)
}

/// Request an out-of-band poll.
#[utoipa::path(
    post,
    path = "/api/v1/poller/refresh",
    tag = "Poller",
    responses(
        (status = 202, description = "Refresh requested"),
        (status = 409, description = "Poller is not active", body = ErrorResponse),
    )
)]
pub async fn refresh_poller(State(poller): State<WarningPoller>) -> Result<StatusCode, AppError> {
    poller.refresh().await?;
    Ok(StatusCode::ACCEPTED)
}
