//! BootNotification handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use tracing::{info, warn};

use super::CentralSystem;
use crate::domain::{BootInfo, DomainResult};

/// Record identification data. Never rejects a charge point.
pub fn handle_boot_notification(
    system: &CentralSystem,
    charge_point_id: &str,
    request: BootNotificationRequest,
) -> DomainResult<BootNotificationResponse> {
    info!(
        charge_point_id,
        vendor = request.charge_point_vendor.as_str(),
        model = request.charge_point_model.as_str(),
        "BootNotification"
    );

    if system.settings.auto_register_on_boot {
        system.registry.ensure(charge_point_id);
    }

    let boot = BootInfo {
        vendor: request.charge_point_vendor,
        model: request.charge_point_model,
        serial_number: request.charge_point_serial_number,
        charge_box_serial_number: request.charge_box_serial_number,
        firmware_version: request.firmware_version,
        iccid: request.iccid,
        imsi: request.imsi,
        meter_type: request.meter_type,
        meter_serial_number: request.meter_serial_number,
    };

    if system
        .registry
        .update(charge_point_id, |state| state.boot = Some(boot))
        .is_err()
    {
        warn!(charge_point_id, "BootNotification from unknown charge point, data discarded");
    }

    Ok(BootNotificationResponse {
        current_time: Utc::now(),
        interval: system.settings.heartbeat_interval.into(),
        status: RegistrationStatus::Accepted,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{central_system, connected, request};
    use crate::application::handlers::{wire_name, HandlerSettings};
    use crate::application::registry::ChargePointRegistry;

    fn boot_request() -> BootNotificationRequest {
        request(json!({
            "chargePointVendor": "Acme",
            "chargePointModel": "Wallbox",
            "chargePointSerialNumber": "SN-1",
            "firmwareVersion": "1.2.3"
        }))
    }

    #[test]
    fn boot_records_identification() {
        let system = connected("CP1");
        let resp = handle_boot_notification(&system, "CP1", boot_request()).unwrap();
        assert_eq!(wire_name(&resp.status).as_deref(), Some("Accepted"));

        let boot = system.registry.get("CP1").unwrap().boot.unwrap();
        assert_eq!(boot.vendor, "Acme");
        assert_eq!(boot.model, "Wallbox");
        assert_eq!(boot.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(boot.firmware_version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn boot_from_unknown_charge_point_is_accepted_but_discarded() {
        let system = central_system();
        let resp = handle_boot_notification(&system, "ghost", boot_request()).unwrap();
        assert_eq!(wire_name(&resp.status).as_deref(), Some("Accepted"));
        assert!(!system.registry.contains("ghost"));
    }

    #[test]
    fn boot_auto_registers_when_enabled() {
        let system = CentralSystem::new(
            ChargePointRegistry::shared(),
            HandlerSettings {
                heartbeat_interval: 60,
                auto_register_on_boot: true,
            },
        );
        handle_boot_notification(&system, "CP9", boot_request()).unwrap();
        let cp = system.registry.get("CP9").unwrap();
        assert_eq!(cp.boot.unwrap().vendor, "Acme");
        assert!(cp.connectors.is_empty());
    }
}
