//! Session registry: live WebSocket connections by charge point identity

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::commands::CommandError;

/// One open connection.
#[derive(Debug)]
struct Session {
    connection_id: u64,
    sender: mpsc::UnboundedSender<String>,
    connected_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

/// Thread-safe registry of active OCPP sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    next_connection_id: AtomicU64,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a connection, replacing any older one for the same identity.
    ///
    /// Returns the connection ID to hand back to [`unregister`](Self::unregister).
    pub fn register(&self, charge_point_id: &str, sender: mpsc::UnboundedSender<String>) -> u64 {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let previous = self.sessions.insert(
            charge_point_id.to_string(),
            Session {
                connection_id,
                sender,
                connected_at: now,
                last_activity: now,
            },
        );
        if let Some(old) = previous {
            warn!(
                charge_point_id,
                old_connection_id = old.connection_id,
                connected_at = %old.connected_at,
                "Replacing existing session"
            );
        }
        info!(charge_point_id, connection_id, "Session registered");
        connection_id
    }

    /// Remove a session if it is still the one identified by `connection_id`.
    ///
    /// Returns `false` when a newer connection has taken over the identity.
    pub fn unregister(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, s| s.connection_id == connection_id)
            .is_some();
        if removed {
            info!(charge_point_id, connection_id, "Session unregistered");
        }
        removed
    }

    pub fn send_to(&self, charge_point_id: &str, message: String) -> Result<(), CommandError> {
        let session = self
            .sessions
            .get(charge_point_id)
            .ok_or_else(|| CommandError::NotConnected(charge_point_id.to_string()))?;
        session
            .sender
            .send(message)
            .map_err(|e| CommandError::SendFailed(e.to_string()))
    }

    pub fn touch(&self, charge_point_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(charge_point_id) {
            session.last_activity = Utc::now();
        }
    }

    pub fn last_activity(&self, charge_point_id: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(charge_point_id).map(|s| s.last_activity)
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
