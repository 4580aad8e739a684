//! Charge Point DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::dto::{MeasurementDto, TransactionDto};
use crate::application::control::ChargePointView;
use crate::domain::{ConfigurationKey, Connector};

/// Charge point response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "CP001",
    "vendor": "AVT-Company",
    "model": "AVT-Express",
    "serial_number": "avt.001.13.1",
    "firmware_version": "0.9.87",
    "status": "Available",
    "error_code": "NoError",
    "is_online": true,
    "connectors": [],
    "transactions": [],
    "configuration": []
}))]
pub struct ChargePointDto {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_box_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_serial_number: Option<String>,
    /// Status reported for connector 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_status: Option<String>,
    /// Whether a WebSocket session is currently open
    pub is_online: bool,
    pub connectors: Vec<ConnectorDto>,
    pub transactions: Vec<TransactionDto>,
    pub configuration: Vec<ConfigurationKeyDto>,
}

impl ChargePointDto {
    pub fn from_view(view: ChargePointView, is_online: bool, now: DateTime<Utc>) -> Self {
        let ChargePointView { id, state } = view;
        let boot = state.boot.unwrap_or_default();
        let non_empty = |s: String| (!s.is_empty()).then_some(s);
        Self {
            id,
            vendor: non_empty(boot.vendor),
            model: non_empty(boot.model),
            serial_number: boot.serial_number,
            charge_box_serial_number: boot.charge_box_serial_number,
            firmware_version: boot.firmware_version,
            iccid: boot.iccid,
            imsi: boot.imsi,
            meter_type: boot.meter_type,
            meter_serial_number: boot.meter_serial_number,
            status: state.status.map(|s| s.to_string()),
            error_code: state.error_code,
            diagnostics_status: state.diagnostics_status.map(|s| s.to_string()),
            firmware_status: state.firmware_status.map(|s| s.to_string()),
            is_online,
            connectors: state
                .connectors
                .into_iter()
                .map(|(id, c)| ConnectorDto::from_domain(id, c, now))
                .collect(),
            transactions: state
                .transactions
                .into_values()
                .map(|tx| TransactionDto::from_domain(tx, now))
                .collect(),
            configuration: state
                .configuration
                .into_iter()
                .map(ConfigurationKeyDto::from)
                .collect(),
        }
    }
}

/// Connector response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "status": "Charging",
    "active_transaction_id": 42
}))]
pub struct ConnectorDto {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_transaction_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<MeasurementDto>,
}

impl ConnectorDto {
    pub fn from_domain(id: u32, connector: Connector, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: connector.status.map(|s| s.to_string()),
            active_transaction_id: connector.active_transaction,
            measurement: connector
                .last_measurement
                .map(|m| MeasurementDto::from_domain(m, now)),
        }
    }
}

/// Configuration key reported by GetConfiguration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfigurationKeyDto {
    pub key: String,
    pub readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl From<ConfigurationKey> for ConfigurationKeyDto {
    fn from(k: ConfigurationKey) -> Self {
        Self {
            key: k.key,
            readonly: k.readonly,
            value: k.value,
        }
    }
}
