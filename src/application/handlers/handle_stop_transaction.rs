//! StopTransaction handler

use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use tracing::{info, warn};

use super::{wire_name, CentralSystem};
use crate::domain::DomainResult;

enum StopOutcome {
    Stopped { connector_released: bool },
    AlreadyEnded,
    Unknown,
}

/// Close a transaction and free its connector.
///
/// Unknown or already ended transactions are acknowledged without touching
/// state, so a charge point replaying its offline queue is never stuck.
pub fn handle_stop_transaction(
    system: &CentralSystem,
    charge_point_id: &str,
    request: StopTransactionRequest,
) -> DomainResult<StopTransactionResponse> {
    let transaction_id = request.transaction_id;
    info!(
        charge_point_id,
        transaction_id,
        meter_stop = request.meter_stop,
        reason = ?request.reason,
        samples = request.transaction_data.as_ref().map_or(0, Vec::len),
        "StopTransaction"
    );

    let reason = request.reason.as_ref().and_then(|r| wire_name(r));

    let outcome = system.registry.update(charge_point_id, |state| {
        let Some(tx) = state.transactions.get_mut(&transaction_id) else {
            return StopOutcome::Unknown;
        };
        if tx.stop(request.timestamp, request.meter_stop, reason).is_err() {
            return StopOutcome::AlreadyEnded;
        }
        let connector_id = tx.connector_id;
        StopOutcome::Stopped {
            connector_released: state.release_connector(connector_id, transaction_id),
        }
    })?;

    match outcome {
        StopOutcome::Stopped { connector_released } => {
            info!(charge_point_id, transaction_id, connector_released, "Transaction stopped");
        }
        StopOutcome::AlreadyEnded => {
            warn!(charge_point_id, transaction_id, "StopTransaction for an ended transaction, ignored");
        }
        StopOutcome::Unknown => {
            warn!(charge_point_id, transaction_id, "StopTransaction for an unknown transaction, ignored");
        }
    }

    Ok(StopTransactionResponse { id_tag_info: None })
}
