//! Transaction DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Measurement, Transaction};

/// Transaction response DTO
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "connector_id": 1,
    "id_tag": "RFID001",
    "started_at": "2024-01-15T10:30:00Z",
    "meter_start": 1000,
    "is_active": true,
    "energy_consumed_wh": 2500.0
}))]
pub struct TransactionDto {
    pub id: i32,
    pub connector_id: u32,
    pub id_tag: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub meter_start: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_stop: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub is_active: bool,
    /// Final energy once ended, otherwise energy so far from the latest register sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_consumed_wh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<MeasurementDto>,
}

impl TransactionDto {
    pub fn from_domain(tx: Transaction, now: DateTime<Utc>) -> Self {
        let energy_consumed_wh = match tx.energy_consumed() {
            Some(wh) => Some(f64::from(wh)),
            None => tx.live_energy_consumed(),
        };
        Self {
            id: tx.id,
            connector_id: tx.connector_id,
            is_active: !tx.is_ended(),
            energy_consumed_wh,
            id_tag: tx.id_tag,
            started_at: tx.started_at,
            ended_at: tx.ended_at,
            meter_start: tx.meter_start,
            meter_stop: tx.meter_stop,
            stop_reason: tx.stop_reason,
            measurement: tx
                .last_measurement
                .map(|m| MeasurementDto::from_domain(m, now)),
        }
    }
}

/// Latest meter sample
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeasurementDto {
    pub taken_at: DateTime<Utc>,
    /// `true` while the sample is younger than 30 seconds
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_wh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_v: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_a: Option<f64>,
}

impl MeasurementDto {
    pub fn from_domain(m: Measurement, now: DateTime<Utc>) -> Self {
        Self {
            is_live: m.is_live(now),
            taken_at: m.taken_at,
            energy_wh: m.energy_wh,
            power_w: m.power_w,
            voltage_v: m.voltage_v,
            current_a: m.current_a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ended_transaction_reports_final_energy() {
        let mut tx = Transaction::new(3, 1, "TAG", 1000, Utc::now());
        let mut m = Measurement::empty(Utc::now());
        m.energy_wh = Some(1200.0);
        tx.record_measurement(m);
        tx.stop(Utc::now(), 1500, Some("Remote".into())).unwrap();

        let dto = TransactionDto::from_domain(tx, Utc::now());
        assert!(!dto.is_active);
        assert_eq!(dto.energy_consumed_wh, Some(500.0));
        assert_eq!(dto.stop_reason.as_deref(), Some("Remote"));
    }

    #[test]
    fn open_transaction_reports_energy_so_far() {
        let mut tx = Transaction::new(4, 2, "TAG", 1000, Utc::now());
        let mut m = Measurement::empty(Utc::now());
        m.energy_wh = Some(1250.0);
        tx.record_measurement(m);

        let dto = TransactionDto::from_domain(tx, Utc::now());
        assert!(dto.is_active);
        assert_eq!(dto.energy_consumed_wh, Some(250.0));
        assert!(dto.measurement.unwrap().is_live);
    }
}
