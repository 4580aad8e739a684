//! Remote command API handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::dto::{
    control_error, ApiResponse, ApiResult, CommandResponse, RemoteStartRequest, RemoteStopRequest,
};
use crate::api::router::ApiState;

/// Soft reset a charge point
#[utoipa::path(
    post,
    path = "/api/v1/charge-points/{charge_point_id}/reset",
    tag = "Commands",
    params(
        ("charge_point_id" = String, Path, description = "Charge point ID")
    ),
    responses(
        (status = 200, description = "Reset accepted", body = ApiResponse<CommandResponse>),
        (status = 404, description = "Charge point not found"),
        (status = 502, description = "Charge point declined"),
        (status = 503, description = "Charge point not connected"),
        (status = 504, description = "No response from charge point")
    )
)]
pub async fn reset_charge_point(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
) -> ApiResult<CommandResponse> {
    state.control.reset(&charge_point_id).await.map_err(control_error)?;
    Ok(Json(ApiResponse::success(CommandResponse::accepted("Reset accepted"))))
}

/// Remote start transaction
#[utoipa::path(
    post,
    path = "/api/v1/charge-points/{charge_point_id}/remote-start",
    tag = "Commands",
    params(
        ("charge_point_id" = String, Path, description = "Charge point ID")
    ),
    request_body = RemoteStartRequest,
    responses(
        (status = 200, description = "Remote start accepted", body = ApiResponse<CommandResponse>),
        (status = 404, description = "Charge point or connector not found"),
        (status = 409, description = "Connector already has an active transaction"),
        (status = 502, description = "Charge point declined"),
        (status = 503, description = "Charge point not connected"),
        (status = 504, description = "No response from charge point")
    )
)]
pub async fn remote_start(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
    Json(request): Json<RemoteStartRequest>,
) -> ApiResult<CommandResponse> {
    state
        .control
        .start_transaction(&charge_point_id, request.connector_id)
        .await
        .map_err(control_error)?;
    Ok(Json(ApiResponse::success(CommandResponse::accepted("Remote start accepted"))))
}

/// Remote stop transaction
#[utoipa::path(
    post,
    path = "/api/v1/charge-points/{charge_point_id}/remote-stop",
    tag = "Commands",
    params(
        ("charge_point_id" = String, Path, description = "Charge point ID")
    ),
    request_body = RemoteStopRequest,
    responses(
        (status = 200, description = "Remote stop accepted", body = ApiResponse<CommandResponse>),
        (status = 404, description = "Charge point or transaction not found"),
        (status = 409, description = "Transaction already ended"),
        (status = 502, description = "Charge point declined"),
        (status = 503, description = "Charge point not connected"),
        (status = 504, description = "No response from charge point")
    )
)]
pub async fn remote_stop(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
    Json(request): Json<RemoteStopRequest>,
) -> ApiResult<CommandResponse> {
    state
        .control
        .stop_transaction(&charge_point_id, request.transaction_id)
        .await
        .map_err(control_error)?;
    Ok(Json(ApiResponse::success(CommandResponse::accepted("Remote stop accepted"))))
}
