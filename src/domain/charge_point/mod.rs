//! Charge Point aggregate
//!
//! A charge point owns its connectors and every transaction it has reported.

pub mod model;

pub use model::{
    BootInfo, ChargePointState, ChargePointStatus, ConfigurationKey, Connector,
    DiagnosticsStatus, FirmwareStatus,
};
