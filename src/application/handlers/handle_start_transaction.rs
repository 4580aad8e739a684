//! StartTransaction handler

use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use tracing::{info, warn};

use super::CentralSystem;
use crate::domain::{DomainResult, Transaction};

/// Open a transaction on a free connector.
///
/// A busy connector yields `Conflict` and leaves both the charge point and
/// the transaction counter untouched.
pub fn handle_start_transaction(
    system: &CentralSystem,
    charge_point_id: &str,
    request: StartTransactionRequest,
) -> DomainResult<StartTransactionResponse> {
    info!(
        charge_point_id,
        connector_id = request.connector_id,
        id_tag = request.id_tag.as_str(),
        meter_start = request.meter_start,
        "StartTransaction"
    );

    let registry = &system.registry;
    let connector_id = request.connector_id;
    let result = registry.update(charge_point_id, |state| {
        state.start_transaction(
            connector_id,
            || registry.allocate_transaction_id(),
            |id| {
                Transaction::new(
                    id,
                    connector_id,
                    request.id_tag.clone(),
                    request.meter_start,
                    request.timestamp,
                )
            },
        )
    })?;

    let transaction_id = match result {
        Ok(id) => id,
        Err(e) => {
            warn!(charge_point_id, connector_id, error = %e, "StartTransaction refused");
            return Err(e);
        }
    };

    info!(charge_point_id, connector_id, transaction_id, "Transaction started");

    Ok(StartTransactionResponse {
        id_tag_info: IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        },
        transaction_id,
    })
}
