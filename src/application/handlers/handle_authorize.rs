//! Authorize handler

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use tracing::info;

use super::CentralSystem;
use crate::domain::DomainResult;

/// Every id tag is accepted; there is no allow-list at this layer.
pub fn handle_authorize(
    _system: &CentralSystem,
    charge_point_id: &str,
    request: AuthorizeRequest,
) -> DomainResult<AuthorizeResponse> {
    info!(charge_point_id, id_tag = request.id_tag.as_str(), "Authorize");

    Ok(AuthorizeResponse {
        id_tag_info: IdTagInfo {
            status: AuthorizationStatus::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        },
    })
}
