//! Domain errors

use thiserror::Error;

/// Failures of registry lookups and state transitions.
///
/// Every variant leaves state untouched: the check happens before any
/// mutation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Exhausted: {0}")]
    Exhausted(&'static str),
}

impl DomainError {
    pub fn charge_point_not_found(charge_point_id: &str) -> Self {
        Self::NotFound {
            entity: "charge point",
            id: charge_point_id.to_string(),
        }
    }

    pub fn connector_not_found(connector_id: u32) -> Self {
        Self::NotFound {
            entity: "connector",
            id: connector_id.to_string(),
        }
    }

    pub fn transaction_not_found(transaction_id: i32) -> Self {
        Self::NotFound {
            entity: "transaction",
            id: transaction_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
