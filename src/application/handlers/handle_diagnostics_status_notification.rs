//! DiagnosticsStatusNotification handler

use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use tracing::{info, warn};

use super::{convert_wire, record_status, CentralSystem};
use crate::domain::{DiagnosticsStatus, DomainResult};

pub fn handle_diagnostics_status_notification(
    system: &CentralSystem,
    charge_point_id: &str,
    request: DiagnosticsStatusNotificationRequest,
) -> DomainResult<DiagnosticsStatusNotificationResponse> {
    info!(charge_point_id, status = ?request.status, "DiagnosticsStatusNotification");

    let status: Option<DiagnosticsStatus> = convert_wire(&request.status);
    if status.is_none() {
        warn!(charge_point_id, status = ?request.status, "Unmapped diagnostics status, keeping previous");
    }
    system
        .registry
        .update(charge_point_id, |state| record_status(&mut state.diagnostics_status, status))?;

    Ok(DiagnosticsStatusNotificationResponse {})
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{connected, request};

    #[test]
    fn records_latest_diagnostics_status() {
        let system = connected("CP1");
        for status in ["Uploading", "Uploaded"] {
            handle_diagnostics_status_notification(&system, "CP1", request(json!({"status": status})))
                .unwrap();
        }
        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.diagnostics_status, Some(DiagnosticsStatus::Uploaded));
    }
}
