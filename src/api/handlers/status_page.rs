//! Operator status page
//!
//! `GET /` renders the whole registry through the `status.html` template.
//! Mutating actions are POST forms addressed to a charge point and, where
//! relevant, a connector or transaction; a plain navigation never changes
//! anything.

use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};
use chrono::{DateTime, Utc};
use tracing::error;

use crate::api::dto::status_for;
use crate::api::router::ApiState;
use crate::application::control::{ChargePointView, ControlError};
use crate::domain::{ChargePointState, Connector, Measurement, Transaction};

#[derive(Template)]
#[template(path = "status.html")]
struct StatusTemplate {
    charge_points: Vec<ChargePointRow>,
}

#[derive(Template)]
#[template(path = "command_result.html")]
struct CommandResultTemplate {
    message: String,
}

struct ChargePointRow {
    id: String,
    /// Percent-encoded identity for action URLs
    path: String,
    online: bool,
    info: Vec<InfoRow>,
    configuration: Vec<ConfigurationRow>,
    connectors: Vec<ConnectorRow>,
    transactions: Vec<TransactionRow>,
}

struct InfoRow {
    name: &'static str,
    value: String,
}

struct ConfigurationRow {
    key: String,
    value: String,
    readonly: bool,
}

struct ConnectorRow {
    id: u32,
    status: String,
    transaction: String,
    measurement: String,
    can_start: bool,
}

struct TransactionRow {
    id: i32,
    connector_id: u32,
    id_tag: String,
    started: String,
    ended: String,
    meter_start: i32,
    meter: String,
    energy: String,
    reason: String,
    open: bool,
}

pub async fn status_page(State(state): State<ApiState>) -> (StatusCode, Html<String>) {
    let views = state.control.status();
    rendered(render_status(&views, |id| state.sessions.is_connected(id), Utc::now()))
}

pub async fn reset(
    State(state): State<ApiState>,
    Path(charge_point_id): Path<String>,
) -> (StatusCode, Html<String>) {
    let result = state.control.reset(&charge_point_id).await;
    action_result(result, format!("Reset of {} accepted", charge_point_id))
}

pub async fn start(
    State(state): State<ApiState>,
    Path((charge_point_id, connector_id)): Path<(String, u32)>,
) -> (StatusCode, Html<String>) {
    let result = state.control.start_transaction(&charge_point_id, connector_id).await;
    action_result(
        result,
        format!("Remote start on {} connector {} accepted", charge_point_id, connector_id),
    )
}

pub async fn stop(
    State(state): State<ApiState>,
    Path((charge_point_id, transaction_id)): Path<(String, i32)>,
) -> (StatusCode, Html<String>) {
    let result = state.control.stop_transaction(&charge_point_id, transaction_id).await;
    action_result(
        result,
        format!("Remote stop of transaction {} on {} accepted", transaction_id, charge_point_id),
    )
}

fn action_result(result: Result<(), ControlError>, accepted: String) -> (StatusCode, Html<String>) {
    let (status, message) = match result {
        Ok(()) => (StatusCode::OK, accepted),
        Err(e) => (status_for(&e), e.to_string()),
    };
    match (CommandResultTemplate { message }).render() {
        Ok(body) => (status, Html(body)),
        Err(e) => rendered(Err(e)),
    }
}

fn rendered(page: askama::Result<String>) -> (StatusCode, Html<String>) {
    match page {
        Ok(body) => (StatusCode::OK, Html(body)),
        Err(e) => {
            error!(error = %e, "Failed to render page");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("Failed to render page".to_string()),
            )
        }
    }
}

/// Render the status view for every charge point.
pub fn render_status(
    views: &[ChargePointView],
    is_online: impl Fn(&str) -> bool,
    now: DateTime<Utc>,
) -> askama::Result<String> {
    let charge_points = views
        .iter()
        .map(|view| charge_point_row(view, is_online(&view.id), now))
        .collect();
    StatusTemplate { charge_points }.render()
}

fn charge_point_row(view: &ChargePointView, online: bool, now: DateTime<Utc>) -> ChargePointRow {
    let cp = &view.state;
    ChargePointRow {
        id: view.id.clone(),
        path: urlencoding::encode(&view.id).into_owned(),
        online,
        info: info_rows(cp),
        configuration: cp
            .configuration
            .iter()
            .map(|key| ConfigurationRow {
                key: key.key.clone(),
                value: key.value.clone().unwrap_or_default(),
                readonly: key.readonly,
            })
            .collect(),
        connectors: cp
            .connectors
            .iter()
            .map(|(id, connector)| connector_row(*id, connector, now))
            .collect(),
        transactions: cp
            .transactions
            .values()
            .rev()
            .map(|tx| transaction_row(tx, now))
            .collect(),
    }
}

fn info_rows(cp: &ChargePointState) -> Vec<InfoRow> {
    let boot = cp.boot.as_ref();
    [
        ("Vendor", boot.map(|b| b.vendor.clone())),
        ("Model", boot.map(|b| b.model.clone())),
        ("Serial number", boot.and_then(|b| b.serial_number.clone())),
        ("Charge box serial number", boot.and_then(|b| b.charge_box_serial_number.clone())),
        ("Firmware version", boot.and_then(|b| b.firmware_version.clone())),
        ("ICCID", boot.and_then(|b| b.iccid.clone())),
        ("IMSI", boot.and_then(|b| b.imsi.clone())),
        ("Meter type", boot.and_then(|b| b.meter_type.clone())),
        ("Meter serial number", boot.and_then(|b| b.meter_serial_number.clone())),
        ("Status", cp.status.map(|s| s.to_string())),
        ("Error code", cp.error_code.clone()),
        ("Diagnostics", cp.diagnostics_status.map(|s| s.to_string())),
        ("Firmware", cp.firmware_status.map(|s| s.to_string())),
    ]
    .into_iter()
    .map(|(name, value)| InfoRow {
        name,
        value: value.unwrap_or_default(),
    })
    .collect()
}

fn connector_row(id: u32, connector: &Connector, now: DateTime<Utc>) -> ConnectorRow {
    ConnectorRow {
        id,
        status: connector.status.map(|s| s.to_string()).unwrap_or_default(),
        transaction: connector
            .active_transaction
            .map(|id| id.to_string())
            .unwrap_or_default(),
        measurement: live_measurement(connector.last_measurement.as_ref(), now).unwrap_or_default(),
        // Connector 0 is the charge point itself.
        can_start: id > 0 && connector.active_transaction.is_none(),
    }
}

fn transaction_row(tx: &Transaction, now: DateTime<Utc>) -> TransactionRow {
    let live = tx.last_measurement.as_ref().filter(|m| m.is_live(now));
    let (meter, energy) = match (tx.meter_stop, live) {
        (Some(stop), _) => (stop.to_string(), tx.energy_consumed().map(|e| e.to_string())),
        (None, Some(m)) => (
            m.energy_wh.map(format_value).unwrap_or_default(),
            tx.live_energy_consumed().map(format_value),
        ),
        (None, None) => (String::new(), None),
    };
    TransactionRow {
        id: tx.id,
        connector_id: tx.connector_id,
        id_tag: tx.id_tag.clone(),
        started: format_time(tx.started_at),
        ended: tx.ended_at.map(format_time).unwrap_or_default(),
        meter_start: tx.meter_start,
        meter,
        energy: energy.unwrap_or_default(),
        reason: tx.stop_reason.clone().unwrap_or_default(),
        open: !tx.is_ended(),
    }
}

/// Sampled values, shown only while the sample is live.
fn live_measurement(m: Option<&Measurement>, now: DateTime<Utc>) -> Option<String> {
    let m = m.filter(|m| m.is_live(now))?;
    let parts: Vec<String> = [
        (m.energy_wh, "Wh"),
        (m.power_w, "W"),
        (m.voltage_v, "V"),
        (m.current_a, "A"),
    ]
    .into_iter()
    .filter_map(|(value, unit)| value.map(|v| format!("{} {}", format_value(v), unit)))
    .collect();
    Some(parts.join(", "))
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}
