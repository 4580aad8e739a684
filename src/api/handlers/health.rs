//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::router::ApiState;

/// Service health
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` while the service is up
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since the control surface started
    pub uptime_seconds: u64,
    /// Entries in the charge point registry
    pub charge_points: usize,
    /// Open WebSocket sessions
    pub connected: usize,
}

/// Health check
///
/// Current status, version and uptime. Use for liveness monitoring.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        charge_points: state.control.registry().len(),
        connected: state.sessions.count(),
    })
}
