//! Charge point read API handlers
//!
//! Served straight from the registry; never waits on a device.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::api::dto::{control_error, ApiResponse, ApiResult, ChargePointDto};
use crate::api::router::ApiState;

/// List all charge points
///
/// Every registered charge point with connectors, transactions and
/// configuration keys, sorted by identity.
#[utoipa::path(
    get,
    path = "/api/v1/charge-points",
    tag = "Charge Points",
    responses(
        (status = 200, description = "Registered charge points", body = ApiResponse<Vec<ChargePointDto>>)
    )
)]
pub async fn list_charge_points(State(state): State<ApiState>) -> Json<ApiResponse<Vec<ChargePointDto>>> {
    let now = Utc::now();
    let charge_points = state
        .control
        .status()
        .into_iter()
        .map(|view| {
            let online = state.sessions.is_connected(&view.id);
            ChargePointDto::from_view(view, online, now)
        })
        .collect();
    Json(ApiResponse::success(charge_points))
}

/// Get charge point by ID
#[utoipa::path(
    get,
    path = "/api/v1/charge-points/{charge_point_id}",
    tag = "Charge Points",
    params(
        ("charge_point_id" = String, Path, description = "Charge point ID")
    ),
    responses(
        (status = 200, description = "Charge point state", body = ApiResponse<ChargePointDto>),
        (status = 404, description = "Charge point not found")
    )
)]
pub async fn get_charge_point(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
) -> ApiResult<ChargePointDto> {
    let view = state.control.charge_point(&charge_point_id).map_err(control_error)?;
    let online = state.sessions.is_connected(&view.id);
    Ok(Json(ApiResponse::success(ChargePointDto::from_view(view, online, Utc::now()))))
}
