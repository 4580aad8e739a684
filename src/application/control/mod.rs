//! Remote control surface
//!
//! Operator-facing reads and commands. Reads go straight to the registry;
//! commands first validate against the registry, then go out through the
//! [`CommandPort`](crate::application::commands::CommandPort) and wait for
//! the device's confirmation.
//!
//! ```text
//! caller ──► preconditions ──► submit(Completion) ──► oneshot rx ──► timeout
//!                 │                  │                    ▲
//!           NotFound/Conflict   TransportFailure          │ fired once, from
//!                                                         │ the engine task
//! ```

use std::time::{Duration, Instant};

use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionRequest;
use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
use rust_ocpp::v1_6::messages::reset::ResetRequest;
use rust_ocpp::v1_6::types::ResetRequestStatus;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::application::commands::{
    CommandError, Completion, ConfirmationStatus, SharedCommandPort,
};
use crate::application::registry::SharedRegistry;
use crate::domain::{ChargePointState, DomainError, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Command could not be submitted: {0}")]
    TransportFailure(CommandError),

    #[error("Charge point declined: {0}")]
    ProtocolRejection(String),

    #[error("No response from charge point")]
    NoResponse,
}

impl From<DomainError> for ControlError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound { .. } => Self::NotFound(e.to_string()),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::Exhausted(_) => Self::Conflict(e.to_string()),
        }
    }
}

impl ControlError {
    fn outcome_label(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::TransportFailure(_) => "transport_failure",
            Self::ProtocolRejection(_) => "rejected",
            Self::NoResponse => "no_response",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// Upper bound on waiting for a device confirmation
    pub command_timeout: Duration,
    /// Id tag sent with RemoteStartTransaction
    pub remote_id_tag: String,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            remote_id_tag: "1".to_string(),
        }
    }
}

/// One charge point as shown by the status view.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargePointView {
    pub id: String,
    pub state: ChargePointState,
}

pub struct RemoteControl {
    registry: SharedRegistry,
    commands: SharedCommandPort,
    settings: ControlSettings,
}

impl RemoteControl {
    pub fn new(registry: SharedRegistry, commands: SharedCommandPort, settings: ControlSettings) -> Self {
        Self {
            registry,
            commands,
            settings,
        }
    }

    /// Every registered charge point, sorted by identity.
    pub fn status(&self) -> Vec<ChargePointView> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(&id).map(|state| ChargePointView { id, state }))
            .collect()
    }

    /// A single charge point, read without a device round trip.
    pub fn charge_point(&self, charge_point_id: &str) -> Result<ChargePointView, ControlError> {
        let state = self.registry.read(charge_point_id, ChargePointState::clone)?;
        Ok(ChargePointView {
            id: charge_point_id.to_string(),
            state,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Soft reset.
    pub async fn reset(&self, charge_point_id: &str) -> Result<(), ControlError> {
        self.registry.read(charge_point_id, |_| ())?;

        let commands = self.commands.clone();
        self.round_trip("Reset", charge_point_id, |done| {
            commands.reset(
                charge_point_id,
                ResetRequest {
                    kind: ResetRequestStatus::Soft,
                },
                done,
            )
        }, |resp| ConfirmationStatus::of(&resp.status))
        .await
    }

    /// Ask the charge point to start charging on an idle connector.
    pub async fn start_transaction(&self, charge_point_id: &str, connector_id: u32) -> Result<(), ControlError> {
        self.registry
            .read(charge_point_id, |state| match state.connector(connector_id) {
                None => Err(DomainError::connector_not_found(connector_id)),
                Some(c) if c.has_transaction_in_progress() => Err(DomainError::Conflict(format!(
                    "connector {} already has an active transaction",
                    connector_id
                ))),
                Some(_) => Ok(()),
            })??;

        let commands = self.commands.clone();
        let id_tag = self.settings.remote_id_tag.clone();
        self.round_trip("RemoteStartTransaction", charge_point_id, |done| {
            commands.remote_start_transaction(
                charge_point_id,
                RemoteStartTransactionRequest {
                    connector_id: Some(connector_id),
                    id_tag,
                    charging_profile: None,
                },
                done,
            )
        }, |resp| ConfirmationStatus::of(&resp.status))
        .await
    }

    /// Ask the charge point to end an open transaction.
    pub async fn stop_transaction(
        &self,
        charge_point_id: &str,
        transaction_id: TransactionId,
    ) -> Result<(), ControlError> {
        self.registry
            .read(charge_point_id, |state| match state.transaction(transaction_id) {
                None => Err(DomainError::transaction_not_found(transaction_id)),
                Some(tx) if tx.is_ended() => Err(DomainError::Conflict(format!(
                    "transaction {} already ended",
                    transaction_id
                ))),
                Some(_) => Ok(()),
            })??;

        let commands = self.commands.clone();
        self.round_trip("RemoteStopTransaction", charge_point_id, |done| {
            commands.remote_stop_transaction(
                charge_point_id,
                RemoteStopTransactionRequest { transaction_id },
                done,
            )
        }, |resp| ConfirmationStatus::of(&resp.status))
        .await
    }

    /// Submit one command and wait, bounded, for its single completion.
    async fn round_trip<T, F, S>(
        &self,
        action: &'static str,
        charge_point_id: &str,
        submit: F,
        status_of: S,
    ) -> Result<(), ControlError>
    where
        T: Send + 'static,
        F: FnOnce(Completion<T>) -> Result<(), CommandError>,
        S: FnOnce(&T) -> ConfirmationStatus,
    {
        let started = Instant::now();
        let (tx, rx) = oneshot::channel();
        let done: Completion<T> = Box::new(move |result| {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(result);
        });

        let result = match submit(done) {
            Err(e) => Err(ControlError::TransportFailure(e)),
            Ok(()) => match tokio::time::timeout(self.settings.command_timeout, rx).await {
                Err(_) | Ok(Err(_)) => Err(ControlError::NoResponse),
                Ok(Ok(Err(e))) => Err(completion_error(e)),
                Ok(Ok(Ok(response))) => {
                    let status = status_of(&response);
                    if status.is_accepted() {
                        Ok(())
                    } else {
                        Err(ControlError::ProtocolRejection(status.to_string()))
                    }
                }
            },
        };

        let outcome = match &result {
            Ok(()) => "accepted",
            Err(e) => e.outcome_label(),
        };
        metrics::histogram!("ocpp_command_latency_seconds", "action" => action)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("ocpp_commands_total", "action" => action, "outcome" => outcome).increment(1);

        match &result {
            Ok(()) => info!(charge_point_id, action, "Command accepted"),
            Err(e) => warn!(charge_point_id, action, error = %e, "Command failed"),
        }
        result
    }
}

fn completion_error(e: CommandError) -> ControlError {
    match e {
        CommandError::Timeout => ControlError::NoResponse,
        CommandError::CallError { code, description } => {
            ControlError::ProtocolRejection(format!("{}: {}", code, description))
        }
        CommandError::InvalidResponse(msg) => ControlError::ProtocolRejection(msg),
        other @ (CommandError::NotConnected(_) | CommandError::SendFailed(_)) => {
            ControlError::TransportFailure(other)
        }
    }
}
