//! DataTransfer handler

use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::types::DataTransferStatus;
use tracing::info;

use super::CentralSystem;
use crate::domain::DomainResult;

pub fn handle_data_transfer(
    _system: &CentralSystem,
    charge_point_id: &str,
    request: DataTransferRequest,
) -> DomainResult<DataTransferResponse> {
    info!(
        charge_point_id,
        vendor_id = request.vendor_string.as_str(),
        message_id = ?request.message_id,
        data = ?request.data,
        "DataTransfer"
    );

    Ok(DataTransferResponse {
        status: DataTransferStatus::Accepted,
        data: None,
    })
}
