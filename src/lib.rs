//! # OCPP Central System
//!
//! OCPP 1.6 central system that keeps the live state of connected charge
//! points, persists it as a snapshot, and lets an operator inspect and
//! command them.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Charge point, connector, transaction and measurement entities
//! - **application**: Registry, inbound event handlers, outbound command port,
//!   connection lifecycle and the remote control surface
//! - **infrastructure**: SQLite snapshot store (sea-orm)
//! - **interfaces**: OCPP-J 1.6 protocol engine over WebSocket
//! - **api**: HTML status page and REST API with Swagger documentation
//! - **support**: OCPP-J frame codec and shutdown signal

pub mod api;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::{init_database, DatabaseConfig, StateStore};

// Re-export API router
pub use api::create_api_router;
