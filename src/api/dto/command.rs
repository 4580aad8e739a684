//! Command DTOs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Remote start transaction request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"connector_id": 1}))]
pub struct RemoteStartRequest {
    /// Idle connector to start charging on
    pub connector_id: u32,
}

/// Remote stop transaction request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"transaction_id": 42}))]
pub struct RemoteStopRequest {
    /// Open transaction to stop
    pub transaction_id: i32,
}

/// Command response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"status": "Accepted", "message": "Reset accepted"}))]
pub struct CommandResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            status: "Accepted".to_string(),
            message: Some(message.into()),
        }
    }
}
