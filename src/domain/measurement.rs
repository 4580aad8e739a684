//! Live meter measurement reported through MeterValues

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a measurement is considered live for display purposes.
pub const LIVE_MEASUREMENT_WINDOW_SECS: i64 = 30;

/// Latest sampled values for a connector or a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Sample timestamp as reported by the charge point
    pub taken_at: DateTime<Utc>,
    /// Energy.Active.Import.Register (Wh)
    pub energy_wh: Option<f64>,
    /// Power.Active.Import (W)
    pub power_w: Option<f64>,
    /// Voltage (V)
    pub voltage_v: Option<f64>,
    /// Current.Import (A)
    pub current_a: Option<f64>,
}

impl Measurement {
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            energy_wh: None,
            power_w: None,
            voltage_v: None,
            current_a: None,
        }
    }

    /// True when no measurand of interest was present in the sample.
    pub fn is_empty(&self) -> bool {
        self.energy_wh.is_none()
            && self.power_w.is_none()
            && self.voltage_v.is_none()
            && self.current_a.is_none()
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.taken_at) < Duration::seconds(LIVE_MEASUREMENT_WINDOW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_measurement_has_no_values() {
        let m = Measurement::empty(Utc::now());
        assert!(m.is_empty());
    }

    #[test]
    fn measurement_goes_stale_after_window() {
        let now = Utc::now();
        let mut m = Measurement::empty(now - Duration::seconds(5));
        m.power_w = Some(7400.0);
        assert!(!m.is_empty());
        assert!(m.is_live(now));

        m.taken_at = now - Duration::seconds(LIVE_MEASUREMENT_WINDOW_SECS + 1);
        assert!(!m.is_live(now));
    }
}
