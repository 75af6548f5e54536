use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::poller::WarningPoller;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" while polling, "idle" when the poller is stopped)
    pub status: String,
    /// Service version
    pub version: String,
    /// Whether the background poller is running
    pub poller_active: bool,
}

/// Health check endpoint.
///
/// Always returns 200; an idle poller is reported as status "idle" so load
/// balancers can tell a stopped poller from an unreachable service.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_check(State(poller): State<WarningPoller>) -> Json<HealthResponse> {
    let active = poller.is_active().await;

    Json(HealthResponse {
        status: if active {
            "ok".to_string()
        } else {
            "idle".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        poller_active: active,
    })
}
