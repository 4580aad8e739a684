//! Application ports (hexagonal architecture boundaries)
//!
//! Inbound events arrive through [`CentralSystemHandler`](crate::application::handlers::CentralSystemHandler),
//! outbound commands leave through [`CommandPort`](crate::application::commands::CommandPort).
//! Persistence of the registry is reached through [`SnapshotSink`].

use std::sync::Arc;

use async_trait::async_trait;

/// Something able to persist the current registry contents.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persist a snapshot now. Failures are logged by the implementation.
    async fn save_now(&self);
}

pub type SharedSnapshotSink = Arc<dyn SnapshotSink>;
