//! One-shot warning lookup.
//!
//! GET /api/v1/warnings: fetches the current DWD document and returns the
//! warnings matching the configured locations, independent of the poll loop.

use axum::extract::State;
use axum::Json;

use crate::errors::{AppError, ErrorResponse};
use crate::models::{sort_warnings, Warning};
use crate::services::poller::WarningPoller;

/// Current warnings for the configured locations, sorted by location and start.
#[utoipa::path(
    get,
    path = "/api/v1/warnings",
    tag = "Warnings",
    responses(
        (status = 200, description = "Matching warnings", body = Vec<Warning>),
        (status = 502, description = "DWD feed unavailable or malformed", body = ErrorResponse),
    )
)]
pub async fn get_current_warnings(
    State(poller): State<WarningPoller>,
) -> Result<Json<Vec<Warning>>, AppError> {
    let mut warnings = poller.get_warnings().await?;
    sort_warnings(&mut warnings);
    Ok(Json(warnings))
}
