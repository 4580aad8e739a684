pub mod commands;
pub mod control;
pub mod handlers;
pub mod lifecycle;
pub mod ports;
pub mod registry;

// Re-export key types for convenience
pub use commands::{CommandError, CommandPort, Completion, SharedCommandPort};
pub use control::{ChargePointView, ControlError, ControlSettings, RemoteControl};
pub use handlers::{CentralSystem, CentralSystemHandler, HandlerSettings, SharedHandler};
pub use lifecycle::{ConnectionLifecycle, DisconnectPolicy};
pub use ports::{SharedSnapshotSink, SnapshotSink};
pub use registry::{ChargePointRegistry, Registration, RegistrySnapshot, SharedRegistry};
