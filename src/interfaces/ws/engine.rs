//! OCPP-J 1.6 protocol engine
//!
//! Routes inbound Calls to the [`CentralSystemHandler`] and correlates
//! outbound Calls with their CallResult / CallError by unique ID. Outbound
//! commands are exposed to the application through [`CommandPort`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
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
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::commands::{CommandError, CommandPort, Completion};
use crate::application::handlers::SharedHandler;
use crate::domain::DomainResult;
use crate::support::ocpp_frame::{error_code, OcppFrame, OcppFrameError};

use super::session::SharedSessionRegistry;

/// Default bound on an outstanding outbound Call.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

type PendingKey = (String, String);

struct PendingCall {
    action: &'static str,
    complete: Box<dyn FnOnce(Result<Value, CommandError>) + Send + Sync + 'static>,
}

/// A CallError to send back for an inbound Call.
struct CallFailure {
    code: &'static str,
    description: String,
}

impl CallFailure {
    fn new(code: &'static str, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

pub struct OcppEngine {
    sessions: SharedSessionRegistry,
    handler: SharedHandler,
    pending: Arc<DashMap<PendingKey, PendingCall>>,
    message_counter: AtomicU64,
    response_timeout: Duration,
}

impl OcppEngine {
    pub fn new(sessions: SharedSessionRegistry, handler: SharedHandler, response_timeout: Duration) -> Self {
        Self {
            sessions,
            handler,
            pending: Arc::new(DashMap::new()),
            message_counter: AtomicU64::new(1),
            response_timeout,
        }
    }

    pub fn sessions(&self) -> &SharedSessionRegistry {
        &self.sessions
    }

    /// Process one inbound text frame; returns the reply frame, if any.
    pub fn handle_text(&self, charge_point_id: &str, text: &str) -> Option<String> {
        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(charge_point_id, error = %e, "Malformed OCPP frame");
                return OcppFrameError::recover_unique_id(text).map(|unique_id| {
                    OcppFrame::error_response(unique_id, error_code::PROTOCOL_ERROR, e.to_string())
                        .serialize()
                });
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                let reply = match self.dispatch(charge_point_id, &action, payload) {
                    Ok(payload) => OcppFrame::CallResult { unique_id, payload },
                    Err(failure) => {
                        warn!(
                            charge_point_id,
                            action = action.as_str(),
                            code = failure.code,
                            description = failure.description.as_str(),
                            "Call rejected"
                        );
                        OcppFrame::error_response(unique_id, failure.code, failure.description)
                    }
                };
                Some(reply.serialize())
            }
            OcppFrame::CallResult { unique_id, payload } => {
                self.complete(charge_point_id, &unique_id, Ok(payload));
                None
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                self.complete(
                    charge_point_id,
                    &unique_id,
                    Err(CommandError::CallError {
                        code: error_code,
                        description: error_description,
                    }),
                );
                None
            }
        }
    }

    fn dispatch(&self, cp: &str, action: &str, payload: Value) -> Result<Value, CallFailure> {
        let h = &self.handler;
        match action {
            "BootNotification" => invoke(payload, |req| h.on_boot_notification(cp, req)),
            "Authorize" => invoke(payload, |req| h.on_authorize(cp, req)),
            "Heartbeat" => invoke(payload, |req| h.on_heartbeat(cp, req)),
            "DataTransfer" => invoke(payload, |req| h.on_data_transfer(cp, req)),
            "StatusNotification" => invoke(payload, |req| h.on_status_notification(cp, req)),
            "StartTransaction" => invoke(payload, |req| h.on_start_transaction(cp, req)),
            "StopTransaction" => invoke(payload, |req| h.on_stop_transaction(cp, req)),
            "MeterValues" => invoke(payload, |req| h.on_meter_values(cp, req)),
            "DiagnosticsStatusNotification" => {
                invoke(payload, |req| h.on_diagnostics_status_notification(cp, req))
            }
            "FirmwareStatusNotification" => {
                invoke(payload, |req| h.on_firmware_status_notification(cp, req))
            }
            other => Err(CallFailure::new(
                error_code::NOT_IMPLEMENTED,
                format!("Action {} is not supported", other),
            )),
        }
    }

    fn complete(&self, charge_point_id: &str, unique_id: &str, result: Result<Value, CommandError>) {
        let key = (charge_point_id.to_string(), unique_id.to_string());
        match self.pending.remove(&key) {
            Some((_, call)) => {
                debug!(charge_point_id, action = call.action, unique_id, ok = result.is_ok(), "Call completed");
                (call.complete)(result);
            }
            None => warn!(charge_point_id, unique_id, "Response for unknown request"),
        }
    }

    /// Fail every outstanding Call of a charge point whose session ended.
    pub fn cleanup_charge_point(&self, charge_point_id: &str) {
        let keys: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|e| e.key().0 == charge_point_id)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            if let Some((_, call)) = self.pending.remove(&key) {
                debug!(charge_point_id, action = call.action, "Abandoning pending call");
                (call.complete)(Err(CommandError::NotConnected(charge_point_id.to_string())));
            }
        }
    }

    fn submit<Req, Resp>(
        &self,
        charge_point_id: &str,
        action: &'static str,
        request: &Req,
        on_complete: Completion<Resp>,
    ) -> Result<(), CommandError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
    {
        let payload = serde_json::to_value(request)
            .map_err(|e| CommandError::SendFailed(format!("Serialization failed: {}", e)))?;
        let unique_id = format!("CS-{}", self.message_counter.fetch_add(1, Ordering::SeqCst));
        let key = (charge_point_id.to_string(), unique_id.clone());

        self.pending.insert(
            key.clone(),
            PendingCall {
                action,
                complete: Box::new(move |raw| {
                    on_complete(raw.and_then(|value| {
                        serde_json::from_value(value)
                            .map_err(|e| CommandError::InvalidResponse(e.to_string()))
                    }))
                }),
            },
        );

        let frame = OcppFrame::Call {
            unique_id: unique_id.clone(),
            action: action.to_string(),
            payload,
        };
        if let Err(e) = self.sessions.send_to(charge_point_id, frame.serialize()) {
            self.pending.remove(&key);
            return Err(e);
        }
        info!(charge_point_id, action, unique_id = unique_id.as_str(), "Sending command");

        let pending = self.pending.clone();
        let timeout = self.response_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, call)) = pending.remove(&key) {
                warn!(charge_point_id = key.0.as_str(), action = call.action, unique_id = key.1.as_str(), "Command timed out");
                (call.complete)(Err(CommandError::Timeout));
            }
        });
        Ok(())
    }
}

/// Decode, handle, encode.
fn invoke<Req, Resp>(payload: Value, f: impl FnOnce(Req) -> DomainResult<Resp>) -> Result<Value, CallFailure>
where
    Req: DeserializeOwned,
    Resp: Serialize,
{
    let request: Req = serde_json::from_value(payload)
        .map_err(|e| CallFailure::new(error_code::FORMATION_VIOLATION, e.to_string()))?;
    let response = f(request).map_err(|e| CallFailure::new(error_code::GENERIC_ERROR, e.to_string()))?;
    serde_json::to_value(response).map_err(|e| CallFailure::new(error_code::INTERNAL_ERROR, e.to_string()))
}

impl CommandPort for OcppEngine {
    fn get_configuration(
        &self,
        charge_point_id: &str,
        request: GetConfigurationRequest,
        on_complete: Completion<GetConfigurationResponse>,
    ) -> Result<(), CommandError> {
        self.submit(charge_point_id, "GetConfiguration", &request, on_complete)
    }

    fn reset(
        &self,
        charge_point_id: &str,
        request: ResetRequest,
        on_complete: Completion<ResetResponse>,
    ) -> Result<(), CommandError> {
        self.submit(charge_point_id, "Reset", &request, on_complete)
    }

    fn remote_start_transaction(
        &self,
        charge_point_id: &str,
        request: RemoteStartTransactionRequest,
        on_complete: Completion<RemoteStartTransactionResponse>,
    ) -> Result<(), CommandError> {
        self.submit(charge_point_id, "RemoteStartTransaction", &request, on_complete)
    }

    fn remote_stop_transaction(
        &self,
        charge_point_id: &str,
        request: RemoteStopTransactionRequest,
        on_complete: Completion<RemoteStopTransactionResponse>,
    ) -> Result<(), CommandError> {
        self.submit(charge_point_id, "RemoteStopTransaction", &request, on_complete)
    }
}
