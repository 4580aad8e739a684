//! StatusNotification handler

use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::types::ChargePointStatus as OcppStatus;
use tracing::info;

use super::{wire_name, CentralSystem};
use crate::domain::{ChargePointStatus, DomainResult};

/// Connector 0 addresses the charge point as a whole.
pub fn handle_status_notification(
    system: &CentralSystem,
    charge_point_id: &str,
    request: StatusNotificationRequest,
) -> DomainResult<StatusNotificationResponse> {
    info!(
        charge_point_id,
        connector_id = request.connector_id,
        status = ?request.status,
        error_code = ?request.error_code,
        "StatusNotification"
    );

    let status = match request.status {
        OcppStatus::Available => ChargePointStatus::Available,
        OcppStatus::Preparing => ChargePointStatus::Preparing,
        OcppStatus::Charging => ChargePointStatus::Charging,
        OcppStatus::SuspendedEV => ChargePointStatus::SuspendedEV,
        OcppStatus::SuspendedEVSE => ChargePointStatus::SuspendedEVSE,
        OcppStatus::Finishing => ChargePointStatus::Finishing,
        OcppStatus::Reserved => ChargePointStatus::Reserved,
        OcppStatus::Unavailable => ChargePointStatus::Unavailable,
        OcppStatus::Faulted => ChargePointStatus::Faulted,
    };
    let error_code = wire_name(&request.error_code);

    system.registry.update(charge_point_id, |state| {
        state.error_code = error_code;
        if request.connector_id == 0 {
            state.status = Some(status);
        } else {
            state.connector_mut(request.connector_id).status = Some(status);
        }
    })?;

    Ok(StatusNotificationResponse {})
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{central_system, connected, request};

    fn notification(connector_id: u32, status: &str, error_code: &str) -> StatusNotificationRequest {
        request(json!({"connectorId": connector_id, "errorCode": error_code, "status": status}))
    }

    #[test]
    fn connector_zero_sets_charge_point_status() {
        let system = connected("CP1");
        handle_status_notification(&system, "CP1", notification(0, "Unavailable", "NoError")).unwrap();

        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.status, Some(ChargePointStatus::Unavailable));
        assert!(cp.connectors.is_empty());
        assert_eq!(cp.error_code.as_deref(), Some("NoError"));
    }

    #[test]
    fn connector_status_creates_connector_lazily() {
        let system = connected("CP1");
        handle_status_notification(&system, "CP1", notification(2, "Faulted", "GroundFailure")).unwrap();

        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.connector(2).unwrap().status, Some(ChargePointStatus::Faulted));
        assert!(cp.connector(1).is_none());
        assert!(cp.status.is_none());
        assert_eq!(cp.error_code.as_deref(), Some("GroundFailure"));
    }

    #[test]
    fn unknown_charge_point_is_not_found() {
        let system = central_system();
        let err = handle_status_notification(&system, "ghost", notification(1, "Available", "NoError"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
