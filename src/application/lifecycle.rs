//! Connection lifecycle hooks
//!
//! The protocol engine reports connects and disconnects here. A connect
//! creates the registry entry and immediately asks the device for its full
//! configuration; a disconnect applies the configured [`DisconnectPolicy`].
//! A disconnect only removes state owned by the connection that ends, so a
//! device that reconnects while the old session is still closing keeps it.

use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationRequest;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::commands::SharedCommandPort;
use crate::application::handlers::SharedHandler;
use crate::application::ports::SharedSnapshotSink;
use crate::application::registry::SharedRegistry;

/// What happens to a charge point's state when its connection closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Drop the entry; only the last periodic snapshot survives.
    #[default]
    Discard,
    /// Persist a snapshot first, then drop the entry.
    Snapshot,
}

pub struct ConnectionLifecycle {
    registry: SharedRegistry,
    handler: SharedHandler,
    commands: SharedCommandPort,
    snapshots: Option<SharedSnapshotSink>,
    policy: DisconnectPolicy,
}

impl ConnectionLifecycle {
    pub fn new(
        registry: SharedRegistry,
        handler: SharedHandler,
        commands: SharedCommandPort,
        snapshots: Option<SharedSnapshotSink>,
        policy: DisconnectPolicy,
    ) -> Self {
        Self {
            registry,
            handler,
            commands,
            snapshots,
            policy,
        }
    }

    /// A charge point completed its WebSocket handshake.
    ///
    /// Returns the connection generation to hand to [`disconnected`](Self::disconnected).
    pub fn connected(&self, charge_point_id: &str) -> u64 {
        let registration = self.registry.connect(charge_point_id);
        self.request_configuration(charge_point_id);
        registration.generation
    }

    /// The session of connection `generation` has closed.
    pub async fn disconnected(&self, charge_point_id: &str, generation: u64) {
        if self.policy == DisconnectPolicy::Snapshot {
            match &self.snapshots {
                Some(sink) => sink.save_now().await,
                None => warn!(charge_point_id, "Snapshot-on-disconnect requested without a store"),
            }
        }
        // Checked after the save: the device may have reconnected meanwhile.
        if self.registry.disconnect(charge_point_id, generation).is_some() {
            info!(charge_point_id, policy = ?self.policy, "Charge point disconnected");
        }
    }

    fn request_configuration(&self, charge_point_id: &str) {
        let handler = self.handler.clone();
        let cp_id = charge_point_id.to_string();
        let submitted = self.commands.get_configuration(
            charge_point_id,
            GetConfigurationRequest { key: None },
            Box::new(move |result| handler.on_get_configuration_result(&cp_id, result)),
        );
        if let Err(e) = submitted {
            warn!(charge_point_id, error = %e, "Could not request configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationResponse;
    use rust_ocpp::v1_6::messages::remote_start_transaction::{
        RemoteStartTransactionRequest, RemoteStartTransactionResponse,
    };
    use rust_ocpp::v1_6::messages::remote_stop_transaction::{
        RemoteStopTransactionRequest, RemoteStopTransactionResponse,
    };
    use rust_ocpp::v1_6::messages::reset::{ResetRequest, ResetResponse};

    use super::*;
    use crate::application::commands::{CommandError, CommandPort, Completion};
    use crate::application::handlers::{CentralSystem, CentralSystemHandler, HandlerSettings};
    use crate::application::ports::SnapshotSink;
    use crate::application::registry::ChargePointRegistry;

    /// Answers GetConfiguration synchronously with a fixed payload.
    struct ConfigAnswering {
        requests: AtomicUsize,
    }

    impl CommandPort for ConfigAnswering {
        fn get_configuration(
            &self,
            _charge_point_id: &str,
            request: GetConfigurationRequest,
            on_complete: Completion<GetConfigurationResponse>,
        ) -> Result<(), CommandError> {
            assert!(request.key.is_none());
            self.requests.fetch_add(1, Ordering::SeqCst);
            let response = serde_json::from_value(serde_json::json!({
                "configurationKey": [{"key": "MeterValueSampleInterval", "readonly": false, "value": "60"}]
            }))
            .unwrap();
            on_complete(Ok(response));
            Ok(())
        }

        fn reset(&self, _: &str, _: ResetRequest, _: Completion<ResetResponse>) -> Result<(), CommandError> {
            unreachable!()
        }

        fn remote_start_transaction(
            &self,
            _: &str,
            _: RemoteStartTransactionRequest,
            _: Completion<RemoteStartTransactionResponse>,
        ) -> Result<(), CommandError> {
            unreachable!()
        }

        fn remote_stop_transaction(
            &self,
            _: &str,
            _: RemoteStopTransactionRequest,
            _: Completion<RemoteStopTransactionResponse>,
        ) -> Result<(), CommandError> {
            unreachable!()
        }
    }

    /// Records which charge points were present at each save.
    struct RecordingSink {
        registry: SharedRegistry,
        saves: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl SnapshotSink for RecordingSink {
        async fn save_now(&self) {
            self.saves.lock().unwrap().push(self.registry.ids());
        }
    }

    /// Holds every save open until released.
    struct GatedSink {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SnapshotSink for GatedSink {
        async fn save_now(&self) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    fn lifecycle(policy: DisconnectPolicy) -> (ConnectionLifecycle, SharedRegistry, Arc<RecordingSink>, Arc<ConfigAnswering>) {
        let registry = ChargePointRegistry::shared();
        let handler = Arc::new(CentralSystem::new(registry.clone(), HandlerSettings::default()));
        let commands = Arc::new(ConfigAnswering {
            requests: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink {
            registry: registry.clone(),
            saves: Mutex::new(Vec::new()),
        });
        let lifecycle = ConnectionLifecycle::new(
            registry.clone(),
            handler,
            commands.clone(),
            Some(sink.clone()),
            policy,
        );
        (lifecycle, registry, sink, commands)
    }

    #[tokio::test]
    async fn connect_registers_and_fetches_configuration() {
        let (lifecycle, registry, _, commands) = lifecycle(DisconnectPolicy::Discard);
        lifecycle.connected("CP1");

        assert_eq!(commands.requests.load(Ordering::SeqCst), 1);
        let cp = registry.get("CP1").unwrap();
        assert_eq!(cp.configuration.len(), 1);
        assert_eq!(cp.configuration[0].key, "MeterValueSampleInterval");
    }

    #[tokio::test]
    async fn discard_policy_drops_entry_without_saving() {
        let (lifecycle, registry, sink, _) = lifecycle(DisconnectPolicy::Discard);
        let generation = lifecycle.connected("CP1");
        lifecycle.disconnected("CP1", generation).await;

        assert!(!registry.contains("CP1"));
        assert!(sink.saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_policy_saves_before_removal() {
        let (lifecycle, registry, sink, _) = lifecycle(DisconnectPolicy::Snapshot);
        let generation = lifecycle.connected("CP1");
        lifecycle.disconnected("CP1", generation).await;

        assert!(!registry.contains("CP1"));
        assert_eq!(*sink.saves.lock().unwrap(), vec![vec!["CP1".to_string()]]);
    }

    #[tokio::test]
    async fn replaced_connection_closing_keeps_live_entry() {
        let (lifecycle, registry, _, _) = lifecycle(DisconnectPolicy::Discard);
        let old = lifecycle.connected("CP1");
        let new = lifecycle.connected("CP1");

        lifecycle.disconnected("CP1", old).await;
        assert!(registry.contains("CP1"));

        lifecycle.disconnected("CP1", new).await;
        assert!(!registry.contains("CP1"));
    }

    #[tokio::test]
    async fn reconnect_during_disconnect_save_keeps_device() {
        let registry = ChargePointRegistry::shared();
        let handler = Arc::new(CentralSystem::new(registry.clone(), HandlerSettings::default()));
        let sink = Arc::new(GatedSink {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            registry.clone(),
            handler.clone(),
            Arc::new(ConfigAnswering {
                requests: AtomicUsize::new(0),
            }),
            Some(sink.clone()),
            DisconnectPolicy::Snapshot,
        ));

        let old = lifecycle.connected("CP1");
        let closing = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.disconnected("CP1", old).await }
        });

        sink.entered.notified().await;
        lifecycle.connected("CP1");
        sink.release.notify_one();
        closing.await.unwrap();

        assert!(registry.contains("CP1"));
        let reply = handler.on_start_transaction(
            "CP1",
            serde_json::from_value(serde_json::json!({
                "connectorId": 1,
                "idTag": "TAG",
                "meterStart": 0,
                "timestamp": "2024-01-01T10:00:00Z"
            }))
            .unwrap(),
        );
        assert_eq!(reply.unwrap().transaction_id, 0);
    }

    #[test]
    fn policy_parses_from_lowercase() {
        let p: DisconnectPolicy = serde_json::from_value(serde_json::json!("snapshot")).unwrap();
        assert_eq!(p, DisconnectPolicy::Snapshot);
        assert_eq!(DisconnectPolicy::default(), DisconnectPolicy::Discard);
    }
}
