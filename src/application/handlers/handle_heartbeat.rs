//! Heartbeat handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use tracing::debug;

use super::CentralSystem;
use crate::domain::DomainResult;

pub fn handle_heartbeat(
    _system: &CentralSystem,
    charge_point_id: &str,
    _request: HeartbeatRequest,
) -> DomainResult<HeartbeatResponse> {
    debug!(charge_point_id, "Heartbeat");
    Ok(HeartbeatResponse {
        current_time: Utc::now(),
    })
}
