//! Outbound commands: Central System to Charge Point
//!
//! ## Architecture
//!
//! ```text
//! RemoteControl / ConnectionLifecycle ──► CommandPort ──► protocol engine
//!                                            │                 │
//!                                   returns at once      device answers later
//!                                   (submission result)        │
//!                                                              ▼
//!                                                 Completion callback (once)
//! ```
//!
//! [`CommandPort`] is the seam to the protocol engine: every command takes a
//! target charge point, the request payload and a [`Completion`] callback,
//! and returns immediately with the submission outcome only. The device's
//! confirmation (or a transport/protocol error) is delivered later, from
//! another task, through the callback.

use std::sync::Arc;

use rust_ocpp::v1_6::messages::get_configuration::{
    GetConfigurationRequest, GetConfigurationResponse,
};
use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};
use serde::Serialize;
use thiserror::Error;

/// Failures of an outbound command, at submission or completion time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Charge point not connected: {0}")]
    NotConnected(String),

    #[error("Failed to send: {0}")]
    SendFailed(String),

    #[error("Response timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },
}

/// One-shot completion callback for an outbound command.
pub type Completion<T> = Box<dyn FnOnce(Result<T, CommandError>) + Send + Sync + 'static>;

/// Command submission capability of the protocol engine.
pub trait CommandPort: Send + Sync {
    fn get_configuration(
        &self,
        charge_point_id: &str,
        request: GetConfigurationRequest,
        on_complete: Completion<GetConfigurationResponse>,
    ) -> Result<(), CommandError>;

    fn reset(
        &self,
        charge_point_id: &str,
        request: ResetRequest,
        on_complete: Completion<ResetResponse>,
    ) -> Result<(), CommandError>;

    fn remote_start_transaction(
        &self,
        charge_point_id: &str,
        request: RemoteStartTransactionRequest,
        on_complete: Completion<RemoteStartTransactionResponse>,
    ) -> Result<(), CommandError>;

    fn remote_stop_transaction(
        &self,
        charge_point_id: &str,
        request: RemoteStopTransactionRequest,
        on_complete: Completion<RemoteStopTransactionResponse>,
    ) -> Result<(), CommandError>;
}

pub type SharedCommandPort = Arc<dyn CommandPort>;

/// Status carried by a confirmation, independent of the message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Accepted,
    Rejected,
    Other(String),
}

impl ConfirmationStatus {
    /// Read the OCPP wire name of any status enum.
    pub fn of<S: Serialize>(status: &S) -> Self {
        match serde_json::to_value(status) {
            Ok(serde_json::Value::String(s)) => Self::from_wire(&s),
            Ok(other) => Self::Other(other.to_string()),
            Err(e) => Self::Other(e.to_string()),
        }
    }

    pub fn from_wire(s: &str) -> Self {
        match s {
            "Accepted" => Self::Accepted,
            "Rejected" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "Accepted"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}
