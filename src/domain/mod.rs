//! Domain layer
//!
//! Entity model for connected charge points: the charge point itself, its
//! connectors, the charging sessions (transactions) it reports and the meter
//! measurements attached to them.

pub mod charge_point;
pub mod error;
pub mod measurement;
pub mod transaction;

pub use charge_point::{
    BootInfo, ChargePointState, ChargePointStatus, ConfigurationKey, Connector,
    DiagnosticsStatus, FirmwareStatus,
};
pub use error::{DomainError, DomainResult};
pub use measurement::Measurement;
pub use transaction::{Transaction, TransactionId};
