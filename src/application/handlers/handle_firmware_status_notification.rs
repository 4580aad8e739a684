//! FirmwareStatusNotification handler

use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use tracing::{info, warn};

use super::{convert_wire, record_status, CentralSystem};
use crate::domain::{DomainResult, FirmwareStatus};

pub fn handle_firmware_status_notification(
    system: &CentralSystem,
    charge_point_id: &str,
    request: FirmwareStatusNotificationRequest,
) -> DomainResult<FirmwareStatusNotificationResponse> {
    info!(charge_point_id, status = ?request.status, "FirmwareStatusNotification");

    let status: Option<FirmwareStatus> = convert_wire(&request.status);
    if status.is_none() {
        warn!(charge_point_id, status = ?request.status, "Unmapped firmware status, keeping previous");
    }
    system
        .registry
        .update(charge_point_id, |state| record_status(&mut state.firmware_status, status))?;

    Ok(FirmwareStatusNotificationResponse {})
}
