//! OCPP-J message framing
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::Value;
use thiserror::Error;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// OCPP-J 1.6 CallError codes used by this server.
pub mod error_code {
    pub const NOT_IMPLEMENTED: &str = "NotImplemented";
    pub const PROTOCOL_ERROR: &str = "ProtocolError";
    pub const FORMATION_VIOLATION: &str = "FormationViolation";
    pub const GENERIC_ERROR: &str = "GenericError";
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        unique_id: String,
        payload: Value,
    },
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Error)]
pub enum OcppFrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Frame is not a non-empty JSON array")]
    NotAnArray,

    #[error("Unknown message type: {0}")]
    UnknownMessageType(Value),

    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },

    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

impl OcppFrameError {
    /// Unique ID of the offending frame, when it can still be read.
    ///
    /// Used to address a CallError back to the sender of a malformed Call.
    pub fn recover_unique_id(text: &str) -> Option<String> {
        let value: Value = serde_json::from_str(text).ok()?;
        value.get(1)?.as_str().map(str::to_string)
    }
}

impl OcppFrame {
    pub fn parse(text: &str) -> Result<Self, OcppFrameError> {
        let arr = match serde_json::from_str::<Value>(text)? {
            Value::Array(arr) if !arr.is_empty() => arr,
            _ => return Err(OcppFrameError::NotAnArray),
        };

        match arr[0].as_u64() {
            Some(MSG_TYPE_CALL) => {
                require(&arr, 4)?;
                Ok(Self::Call {
                    unique_id: string_at(&arr, 1, "uniqueId must be a string")?,
                    action: string_at(&arr, 2, "action must be a string")?,
                    payload: arr[3].clone(),
                })
            }
            Some(MSG_TYPE_CALL_RESULT) => {
                require(&arr, 3)?;
                Ok(Self::CallResult {
                    unique_id: string_at(&arr, 1, "uniqueId must be a string")?,
                    payload: arr[2].clone(),
                })
            }
            Some(MSG_TYPE_CALL_ERROR) => {
                require(&arr, 4)?;
                Ok(Self::CallError {
                    unique_id: string_at(&arr, 1, "uniqueId must be a string")?,
                    error_code: arr[2].as_str().unwrap_or(error_code::GENERIC_ERROR).to_string(),
                    error_description: arr[3].as_str().unwrap_or_default().to_string(),
                    error_details: arr.get(4).cloned().unwrap_or_else(empty_object),
                })
            }
            _ => Err(OcppFrameError::UnknownMessageType(arr[0].clone())),
        }
    }

    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => serde_json::json!([MSG_TYPE_CALL, unique_id, action, payload]),
            Self::CallResult { unique_id, payload } => {
                serde_json::json!([MSG_TYPE_CALL_RESULT, unique_id, payload])
            }
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => serde_json::json!([
                MSG_TYPE_CALL_ERROR,
                unique_id,
                error_code,
                error_description,
                error_details
            ]),
        };
        arr.to_string()
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }
}

fn require(arr: &[Value], expected: usize) -> Result<(), OcppFrameError> {
    if arr.len() < expected {
        return Err(OcppFrameError::MissingFields {
            expected,
            got: arr.len(),
        });
    }
    Ok(())
}

fn string_at(arr: &[Value], index: usize, what: &'static str) -> Result<String, OcppFrameError> {
    arr[index]
        .as_str()
        .map(str::to_string)
        .ok_or(OcppFrameError::FieldTypeMismatch(what))
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
