//! MeterValues handler

use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::types::{Measurand, MeterValue, UnitOfMeasure};
use tracing::{debug, info};

use super::CentralSystem;
use crate::domain::{DomainResult, Measurement};

/// Fold sampled values into a single measurement.
///
/// Later samples win. A sample without a measurand is the energy register,
/// and kWh/kW are normalised to Wh/W. Returns `None` when nothing usable
/// was reported.
pub fn measurement_from_meter_values(meter_values: &[MeterValue]) -> Option<Measurement> {
    let mut measurement: Option<Measurement> = None;

    for meter_value in meter_values {
        let m = measurement.get_or_insert_with(|| Measurement::empty(meter_value.timestamp));
        if meter_value.timestamp > m.taken_at {
            m.taken_at = meter_value.timestamp;
        }

        for sampled in &meter_value.sampled_value {
            let value: f64 = match sampled.value.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };

            let measurand = sampled
                .measurand
                .clone()
                .unwrap_or(Measurand::EnergyActiveImportRegister);

            match measurand {
                Measurand::EnergyActiveImportRegister => {
                    m.energy_wh = Some(match sampled.unit.as_ref() {
                        Some(UnitOfMeasure::KWh) => value * 1000.0,
                        _ => value,
                    });
                }
                Measurand::PowerActiveImport => {
                    m.power_w = Some(match sampled.unit.as_ref() {
                        Some(UnitOfMeasure::Kw) => value * 1000.0,
                        _ => value,
                    });
                }
                Measurand::Voltage => m.voltage_v = Some(value),
                Measurand::CurrentImport => m.current_a = Some(value),
                other => debug!(measurand = ?other, value, "Unhandled measurand"),
            }
        }
    }

    measurement.filter(|m| !m.is_empty())
}

pub fn handle_meter_values(
    system: &CentralSystem,
    charge_point_id: &str,
    request: MeterValuesRequest,
) -> DomainResult<MeterValuesResponse> {
    info!(
        charge_point_id,
        connector_id = request.connector_id,
        transaction_id = ?request.transaction_id,
        samples = request.meter_value.len(),
        "MeterValues"
    );

    let Some(measurement) = measurement_from_meter_values(&request.meter_value) else {
        // Still reject unknown charge points.
        system.registry.read(charge_point_id, |_| ())?;
        return Ok(MeterValuesResponse {});
    };

    let connector_id = request.connector_id;
    let recorded_on_transaction = system.registry.update(charge_point_id, |state| {
        if connector_id != 0 {
            state.connector_mut(connector_id).last_measurement = Some(measurement.clone());
        }
        request
            .transaction_id
            .and_then(|id| state.transactions.get_mut(&id))
            .map(|tx| tx.record_measurement(measurement.clone()))
            .unwrap_or(false)
    })?;

    debug!(
        charge_point_id,
        energy_wh = ?measurement.energy_wh,
        power_w = ?measurement.power_w,
        recorded_on_transaction,
        "MeterValues recorded"
    );

    Ok(MeterValuesResponse {})
}
