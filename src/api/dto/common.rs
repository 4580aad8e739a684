//! Common API DTOs

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::application::control::ControlError;

/// Standard response envelope
///
/// Every JSON endpoint wraps its payload in this envelope.
/// On success: `{"success": true, "data": {...}}`,
/// on failure: `{"success": false, "data": null, "error": "description"}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// `true` if the request succeeded
    pub success: bool,
    /// Payload, `null` on failure
    pub data: Option<T>,
    /// Error description, omitted on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler result carrying the envelope on both arms.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

/// HTTP status for a failed control operation.
pub fn status_for(error: &ControlError) -> StatusCode {
    match error {
        ControlError::NotFound(_) => StatusCode::NOT_FOUND,
        ControlError::Conflict(_) => StatusCode::CONFLICT,
        ControlError::TransportFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        ControlError::ProtocolRejection(_) => StatusCode::BAD_GATEWAY,
        ControlError::NoResponse => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// Error arm of [`ApiResult`] for a control failure.
pub fn control_error<T>(error: ControlError) -> (StatusCode, Json<ApiResponse<T>>) {
    (status_for(&error), Json(ApiResponse::error(error.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::commands::CommandError;

    #[test]
    fn control_errors_map_to_distinct_statuses() {
        let cases = [
            (ControlError::NotFound("x".into()), 404),
            (ControlError::Conflict("x".into()), 409),
            (ControlError::TransportFailure(CommandError::NotConnected("CP1".into())), 503),
            (ControlError::ProtocolRejection("Rejected".into()), 502),
            (ControlError::NoResponse, 504),
        ];
        for (error, code) in cases {
            assert_eq!(status_for(&error).as_u16(), code, "{:?}", error);
        }
    }

    #[test]
    fn envelope_omits_error_on_success() {
        let ok = serde_json::to_value(ApiResponse::success(1)).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "data": 1}));

        let err = serde_json::to_value(ApiResponse::<u8>::error("boom")).unwrap();
        assert_eq!(
            err,
            serde_json::json!({"success": false, "data": null, "error": "boom"})
        );
    }
}
