//! Transaction domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult, Measurement};

/// Process-wide transaction identifier (OCPP `transactionId`).
pub type TransactionId = i32;

/// One charging session occupying a single connector.
///
/// A transaction is ended once `ended_at` is set; from then on it is
/// immutable and only kept for history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,
    /// Connector ID
    pub connector_id: u32,
    /// ID tag that authorized the transaction
    pub id_tag: String,
    /// When the transaction started
    pub started_at: DateTime<Utc>,
    /// When the transaction stopped
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// Meter value at stop (Wh)
    #[serde(default)]
    pub meter_stop: Option<i32>,
    /// Stop reason as reported by the charge point
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Latest meter values received for this transaction
    #[serde(default)]
    pub last_measurement: Option<Measurement>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            connector_id,
            id_tag: id_tag.into(),
            started_at,
            ended_at: None,
            meter_start,
            meter_stop: None,
            stop_reason: None,
            last_measurement: None,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Record the end of the session. Fails with `Conflict` if it already ended.
    pub fn stop(
        &mut self,
        ended_at: DateTime<Utc>,
        meter_stop: i32,
        reason: Option<String>,
    ) -> DomainResult<()> {
        if self.is_ended() {
            return Err(DomainError::Conflict(format!(
                "transaction {} already ended",
                self.id
            )));
        }
        self.ended_at = Some(ended_at);
        self.meter_stop = Some(meter_stop);
        self.stop_reason = reason;
        Ok(())
    }

    /// Attach a live measurement. Ended transactions are left untouched.
    pub fn record_measurement(&mut self, measurement: Measurement) -> bool {
        if self.is_ended() {
            return false;
        }
        self.last_measurement = Some(measurement);
        true
    }

    /// Energy delivered over the whole session (Wh), once ended.
    pub fn energy_consumed(&self) -> Option<i32> {
        self.meter_stop.map(|stop| stop - self.meter_start)
    }

    /// Energy delivered so far according to the latest energy register sample.
    pub fn live_energy_consumed(&self) -> Option<f64> {
        self.last_measurement
            .as_ref()
            .and_then(|m| m.energy_wh)
            .map(|wh| wh - f64::from(self.meter_start))
    }
}
