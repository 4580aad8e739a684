//! WebSocket interface: OCPP-J 1.6 protocol engine and accept loop

pub mod engine;
pub mod ocpp_server;
pub mod session;

pub use engine::{OcppEngine, DEFAULT_RESPONSE_TIMEOUT};
pub use ocpp_server::OcppServer;
pub use session::{SessionRegistry, SharedSessionRegistry};
