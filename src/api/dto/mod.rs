//! Request and response DTOs

pub mod charge_point;
pub mod command;
pub mod common;
pub mod transaction;

pub use charge_point::{ChargePointDto, ConfigurationKeyDto, ConnectorDto};
pub use command::{CommandResponse, RemoteStartRequest, RemoteStopRequest};
pub use common::{control_error, status_for, ApiResponse, ApiResult};
pub use transaction::{MeasurementDto, TransactionDto};
