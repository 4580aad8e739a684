//! GetConfiguration confirmation handler
//!
//! GetConfiguration is issued by this system right after a charge point
//! connects; the confirmation lands here through the command callback.

use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationResponse;
use tracing::{error, info, warn};

use super::CentralSystem;
use crate::application::commands::CommandError;
use crate::domain::ConfigurationKey;

pub fn handle_get_configuration_result(
    system: &CentralSystem,
    charge_point_id: &str,
    result: Result<GetConfigurationResponse, CommandError>,
) {
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            error!(charge_point_id, error = %e, "GetConfiguration failed");
            return;
        }
    };

    if let Some(unknown) = response.unknown_key.as_ref().filter(|keys| !keys.is_empty()) {
        warn!(charge_point_id, ?unknown, "GetConfiguration reported unknown keys");
    }

    let keys: Vec<ConfigurationKey> = response
        .configuration_key
        .unwrap_or_default()
        .into_iter()
        .map(|kv| ConfigurationKey {
            key: kv.key,
            readonly: kv.readonly,
            value: kv.value,
        })
        .collect();
    let count = keys.len();

    match system
        .registry
        .update(charge_point_id, |state| state.configuration = keys)
    {
        Ok(()) => info!(charge_point_id, keys = count, "Configuration stored"),
        Err(e) => error!(charge_point_id, error = %e, "Configuration for unregistered charge point"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::handlers::test_support::{central_system, connected, request};

    fn response() -> GetConfigurationResponse {
        request(json!({
            "configurationKey": [
                {"key": "HeartbeatInterval", "readonly": false, "value": "300"},
                {"key": "NumberOfConnectors", "readonly": true, "value": "2"}
            ],
            "unknownKey": ["Bogus"]
        }))
    }

    #[test]
    fn stores_reported_keys() {
        let system = connected("CP1");
        handle_get_configuration_result(&system, "CP1", Ok(response()));
        let cp = system.registry.get("CP1").unwrap();
        assert_eq!(cp.configuration.len(), 2);
        assert_eq!(cp.configuration[1].key, "NumberOfConnectors");
        assert!(cp.configuration[1].readonly);
        assert_eq!(cp.configuration[0].value.as_deref(), Some("300"));
    }

    #[test]
    fn failure_leaves_state_alone() {
        let system = connected("CP1");
        handle_get_configuration_result(&system, "CP1", Err(CommandError::Timeout));
        assert!(system.registry.get("CP1").unwrap().configuration.is_empty());
    }

    #[test]
    fn unregistered_charge_point_is_ignored() {
        let system = central_system();
        handle_get_configuration_result(&system, "ghost", Ok(response()));
        assert!(system.registry.is_empty());
    }
}
