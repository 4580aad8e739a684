//! Inbound OCPP 1.6 event handlers
//!
//! [`CentralSystemHandler`] is the capability set a protocol engine invokes:
//! one method per charge-point-initiated message, each taking the charge
//! point identity and the typed `rust_ocpp::v1_6` request and returning the
//! confirmation or a [`DomainError`] that the engine reports to the device
//! as a CallError. [`CentralSystem`] implements it on top of the registry;
//! each message lives in its own `handle_*` module.

use std::sync::Arc;

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationResponse;
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::application::commands::CommandError;
use crate::application::registry::SharedRegistry;
use crate::domain::DomainResult;

mod handle_authorize;
mod handle_boot_notification;
mod handle_data_transfer;
mod handle_diagnostics_status_notification;
mod handle_firmware_status_notification;
mod handle_get_configuration;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub use handle_authorize::handle_authorize;
pub use handle_boot_notification::handle_boot_notification;
pub use handle_data_transfer::handle_data_transfer;
pub use handle_diagnostics_status_notification::handle_diagnostics_status_notification;
pub use handle_firmware_status_notification::handle_firmware_status_notification;
pub use handle_get_configuration::handle_get_configuration_result;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::{handle_meter_values, measurement_from_meter_values};
pub use handle_start_transaction::handle_start_transaction;
pub use handle_status_notification::handle_status_notification;
pub use handle_stop_transaction::handle_stop_transaction;

/// Charge-point-initiated events consumed from the protocol engine.
pub trait CentralSystemHandler: Send + Sync {
    fn on_boot_notification(
        &self,
        charge_point_id: &str,
        request: BootNotificationRequest,
    ) -> DomainResult<BootNotificationResponse>;

    fn on_authorize(
        &self,
        charge_point_id: &str,
        request: AuthorizeRequest,
    ) -> DomainResult<AuthorizeResponse>;

    fn on_heartbeat(
        &self,
        charge_point_id: &str,
        request: HeartbeatRequest,
    ) -> DomainResult<HeartbeatResponse>;

    fn on_data_transfer(
        &self,
        charge_point_id: &str,
        request: DataTransferRequest,
    ) -> DomainResult<DataTransferResponse>;

    fn on_status_notification(
        &self,
        charge_point_id: &str,
        request: StatusNotificationRequest,
    ) -> DomainResult<StatusNotificationResponse>;

    fn on_start_transaction(
        &self,
        charge_point_id: &str,
        request: StartTransactionRequest,
    ) -> DomainResult<StartTransactionResponse>;

    fn on_stop_transaction(
        &self,
        charge_point_id: &str,
        request: StopTransactionRequest,
    ) -> DomainResult<StopTransactionResponse>;

    fn on_meter_values(
        &self,
        charge_point_id: &str,
        request: MeterValuesRequest,
    ) -> DomainResult<MeterValuesResponse>;

    fn on_diagnostics_status_notification(
        &self,
        charge_point_id: &str,
        request: DiagnosticsStatusNotificationRequest,
    ) -> DomainResult<DiagnosticsStatusNotificationResponse>;

    fn on_firmware_status_notification(
        &self,
        charge_point_id: &str,
        request: FirmwareStatusNotificationRequest,
    ) -> DomainResult<FirmwareStatusNotificationResponse>;

    /// Completion of a GetConfiguration this system issued itself.
    fn on_get_configuration_result(
        &self,
        charge_point_id: &str,
        result: Result<GetConfigurationResponse, CommandError>,
    );
}

pub type SharedHandler = Arc<dyn CentralSystemHandler>;

/// Behaviour knobs of the event handler.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Heartbeat interval handed out in BootNotification confirmations (seconds)
    pub heartbeat_interval: u16,
    /// Create a registry entry for a BootNotification from an unknown identity
    pub auto_register_on_boot: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: 600,
            auto_register_on_boot: false,
        }
    }
}

/// Registry-backed implementation of [`CentralSystemHandler`].
pub struct CentralSystem {
    pub(crate) registry: SharedRegistry,
    pub(crate) settings: HandlerSettings,
}

impl CentralSystem {
    pub fn new(registry: SharedRegistry, settings: HandlerSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }
}

impl CentralSystemHandler for CentralSystem {
    fn on_boot_notification(
        &self,
        charge_point_id: &str,
        request: BootNotificationRequest,
    ) -> DomainResult<BootNotificationResponse> {
        handle_boot_notification(self, charge_point_id, request)
    }

    fn on_authorize(
        &self,
        charge_point_id: &str,
        request: AuthorizeRequest,
    ) -> DomainResult<AuthorizeResponse> {
        handle_authorize(self, charge_point_id, request)
    }

    fn on_heartbeat(
        &self,
        charge_point_id: &str,
        request: HeartbeatRequest,
    ) -> DomainResult<HeartbeatResponse> {
        handle_heartbeat(self, charge_point_id, request)
    }

    fn on_data_transfer(
        &self,
        charge_point_id: &str,
        request: DataTransferRequest,
    ) -> DomainResult<DataTransferResponse> {
        handle_data_transfer(self, charge_point_id, request)
    }

    fn on_status_notification(
        &self,
        charge_point_id: &str,
        request: StatusNotificationRequest,
    ) -> DomainResult<StatusNotificationResponse> {
        handle_status_notification(self, charge_point_id, request)
    }

    fn on_start_transaction(
        &self,
        charge_point_id: &str,
        request: StartTransactionRequest,
    ) -> DomainResult<StartTransactionResponse> {
        handle_start_transaction(self, charge_point_id, request)
    }

    fn on_stop_transaction(
        &self,
        charge_point_id: &str,
        request: StopTransactionRequest,
    ) -> DomainResult<StopTransactionResponse> {
        handle_stop_transaction(self, charge_point_id, request)
    }

    fn on_meter_values(
        &self,
        charge_point_id: &str,
        request: MeterValuesRequest,
    ) -> DomainResult<MeterValuesResponse> {
        handle_meter_values(self, charge_point_id, request)
    }

    fn on_diagnostics_status_notification(
        &self,
        charge_point_id: &str,
        request: DiagnosticsStatusNotificationRequest,
    ) -> DomainResult<DiagnosticsStatusNotificationResponse> {
        handle_diagnostics_status_notification(self, charge_point_id, request)
    }

    fn on_firmware_status_notification(
        &self,
        charge_point_id: &str,
        request: FirmwareStatusNotificationRequest,
    ) -> DomainResult<FirmwareStatusNotificationResponse> {
        handle_firmware_status_notification(self, charge_point_id, request)
    }

    fn on_get_configuration_result(
        &self,
        charge_point_id: &str,
        result: Result<GetConfigurationResponse, CommandError>,
    ) {
        handle_get_configuration_result(self, charge_point_id, result)
    }
}

/// Convert between a `rust_ocpp` enum and its domain counterpart through
/// the shared OCPP wire name.
pub(crate) fn convert_wire<S: Serialize, T: DeserializeOwned>(value: &S) -> Option<T> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
}

/// Store a reported status; one that failed conversion leaves the previous value.
pub(crate) fn record_status<T>(slot: &mut Option<T>, reported: Option<T>) {
    if let Some(status) = reported {
        *slot = Some(status);
    }
}

/// OCPP wire name of an enum value.
pub(crate) fn wire_name<S: Serialize>(value: &S) -> Option<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use serde::de::DeserializeOwned;
    use serde_json::Value;

    use super::*;
    use crate::application::registry::ChargePointRegistry;

    /// Build a typed request from its OCPP-J JSON payload.
    pub fn request<T: DeserializeOwned>(payload: Value) -> T {
        serde_json::from_value(payload).expect("valid OCPP payload")
    }

    pub fn central_system() -> CentralSystem {
        CentralSystem::new(ChargePointRegistry::shared(), HandlerSettings::default())
    }

    pub fn connected(charge_point_id: &str) -> CentralSystem {
        let system = central_system();
        system.registry.connect(charge_point_id);
        system
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::{connected, request};
    use super::*;
    use crate::domain::ChargePointStatus;

    fn start(system: &CentralSystem, connector_id: u32, meter_start: i32, tag: &str) -> DomainResult<StartTransactionResponse> {
        system.on_start_transaction(
            "CP1",
            request(json!({
                "connectorId": connector_id,
                "idTag": tag,
                "meterStart": meter_start,
                "timestamp": "2024-01-01T10:00:00Z"
            })),
        )
    }

    fn stop(system: &CentralSystem, transaction_id: i32, meter_stop: i32) -> DomainResult<StopTransactionResponse> {
        system.on_stop_transaction(
            "CP1",
            request(json!({
                "transactionId": transaction_id,
                "meterStop": meter_stop,
                "timestamp": "2024-01-01T11:00:00Z"
            })),
        )
    }

    #[test]
    fn charging_session_walkthrough() {
        let system = connected("CP1");

        let boot = system
            .on_boot_notification(
                "CP1",
                request(json!({"chargePointVendor": "Vendor", "chargePointModel": "Model"})),
            )
            .unwrap();
        assert_eq!(wire_name(&boot.status).as_deref(), Some("Accepted"));
        let cp = system.registry.get("CP1").unwrap();
        assert!(cp.connectors.is_empty());
        assert!(cp.transactions.is_empty());

        system
            .on_status_notification(
                "CP1",
                request(json!({"connectorId": 1, "errorCode": "NoError", "status": "Available"})),
            )
            .unwrap();
        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.connector(1).unwrap().status, Some(ChargePointStatus::Available));

        let started = start(&system, 1, 100, "TAG1").unwrap();
        assert_eq!(started.transaction_id, 0);
        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.connector(1).unwrap().active_transaction, Some(0));

        let before = system.registry.get("CP1").unwrap();
        let err = start(&system, 1, 120, "TAG2").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(system.registry.get("CP1").unwrap(), before);

        stop(&system, 0, 150).unwrap();
        let cp = system.registry.get("CP1").unwrap();
        assert!(cp.connector(1).unwrap().active_transaction.is_none());
        let tx = cp.transaction(0).unwrap();
        assert!(tx.is_ended());
        assert_eq!(tx.meter_stop, Some(150));
        assert_eq!(tx.meter_start, 100);
        assert_eq!(tx.id_tag, "TAG1");
        assert_eq!(system.registry.next_transaction_id(), 1);
        cp.check_invariants().unwrap();
    }

    #[test]
    fn events_for_unknown_charge_point_are_not_found() {
        let system = connected("CP1");
        let err = system
            .on_start_transaction(
                "ghost",
                request(json!({
                    "connectorId": 1, "idTag": "T", "meterStart": 0,
                    "timestamp": "2024-01-01T10:00:00Z"
                })),
            )
            .unwrap_err();
        assert!(err.is_not_found());

        let err = system
            .on_stop_transaction(
                "ghost",
                request(json!({"transactionId": 1, "meterStop": 0, "timestamp": "2024-01-01T10:00:00Z"})),
            )
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(system.registry.next_transaction_id(), 0);
    }

    #[test]
    fn transaction_ids_are_unique_across_charge_points() {
        let system = connected("CP1");
        system.registry.connect("CP2");

        let a = start(&system, 1, 0, "A").unwrap().transaction_id;
        let b = system
            .on_start_transaction(
                "CP2",
                request(json!({
                    "connectorId": 1, "idTag": "B", "meterStart": 0,
                    "timestamp": "2024-01-01T10:00:00Z"
                })),
            )
            .unwrap()
            .transaction_id;
        let c = start(&system, 2, 0, "C").unwrap().transaction_id;
        assert!(a < b && b < c);
    }

    #[test]
    fn stopped_connector_accepts_a_new_transaction() {
        let system = connected("CP1");
        start(&system, 1, 0, "A").unwrap();
        stop(&system, 0, 10).unwrap();
        let next = start(&system, 1, 10, "B").unwrap();
        assert_eq!(next.transaction_id, 1);
        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.transactions.len(), 2);
        cp.check_invariants().unwrap();
    }

    #[test]
    fn unmapped_status_keeps_previous_value() {
        let mut slot = Some(ChargePointStatus::Charging);
        record_status(&mut slot, convert_wire(&"Broken"));
        assert_eq!(slot, Some(ChargePointStatus::Charging));
        record_status(&mut slot, convert_wire(&"Finishing"));
        assert_eq!(slot, Some(ChargePointStatus::Finishing));
    }

    #[test]
    fn wire_conversion_maps_enums() {
        let status: Option<ChargePointStatus> = convert_wire(&"Faulted");
        assert_eq!(status, Some(ChargePointStatus::Faulted));
        let status: Option<ChargePointStatus> = convert_wire(&"Broken");
        assert_eq!(status, None);
    }
}
