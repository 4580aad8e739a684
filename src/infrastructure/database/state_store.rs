//! Registry snapshot persistence
//!
//! The whole registry is stored as one JSON document under [`SNAPSHOT_KEY`]
//! in the `state` key/value table. Each save replaces the previous one.

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::entities::state;
use super::migrator::{Migrator, MigratorTrait};
use crate::application::ports::SnapshotSink;
use crate::application::registry::{RegistrySnapshot, SharedRegistry};
use crate::support::shutdown::ShutdownSignal;

/// Row key holding the registry snapshot.
pub const SNAPSHOT_KEY: &str = "chargepoints";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct StateStore {
    db: DatabaseConnection,
    registry: SharedRegistry,
    interval: Duration,
}

impl StateStore {
    pub fn new(db: DatabaseConnection, registry: SharedRegistry, interval: Duration) -> Self {
        Self {
            db,
            registry,
            interval,
        }
    }

    /// Create the schema if missing. Safe to call on an existing database.
    pub async fn init(&self) -> Result<(), StoreError> {
        Migrator::up(&self.db, None).await?;
        debug!("State schema ready");
        Ok(())
    }

    /// Write the current registry, replacing any previous snapshot.
    pub async fn save(&self) -> Result<(), StoreError> {
        let snapshot = self.registry.snapshot();
        let charge_points = snapshot.charge_points.len();
        let value = serde_json::to_string(&snapshot)?;

        let model = state::ActiveModel {
            key: Set(SNAPSHOT_KEY.to_string()),
            value: Set(value),
        };
        state::Entity::insert(model)
            .on_conflict(
                OnConflict::column(state::Column::Key)
                    .update_column(state::Column::Value)
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        debug!(charge_points, "Snapshot saved");
        Ok(())
    }

    /// Load the snapshot into the registry.
    ///
    /// Returns `false` on first run (no snapshot). An undecodable snapshot is
    /// an error; callers treat it as fatal.
    pub async fn restore(&self) -> Result<bool, StoreError> {
        let Some(row) = state::Entity::find_by_id(SNAPSHOT_KEY.to_string())
            .one(&self.db)
            .await?
        else {
            info!("No snapshot found, starting with an empty registry");
            return Ok(false);
        };

        let snapshot: RegistrySnapshot = serde_json::from_str(&row.value)?;
        self.registry.restore(snapshot);
        Ok(true)
    }

    /// Save, logging instead of propagating failures.
    pub async fn save_logged(&self) {
        match self.save().await {
            Ok(()) => {
                metrics::counter!("ocpp_snapshot_saves_total", "outcome" => "ok").increment(1);
            }
            Err(e) => {
                metrics::counter!("ocpp_snapshot_saves_total", "outcome" => "error").increment(1);
                warn!(error = %e, "Snapshot save failed, retrying on next interval");
            }
        }
    }

    /// Periodic save loop. Returns after a final save once shutdown is signalled.
    ///
    /// A save in progress is never interrupted by the signal.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut stop = shutdown.subscribe();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Snapshot loop started");

        while !shutdown.is_triggered() {
            tokio::select! {
                _ = ticker.tick() => self.save_logged().await,
                _ = stop.recv() => break,
            }
        }

        self.save_logged().await;
        info!("Snapshot loop stopped");
    }
}

#[async_trait]
impl SnapshotSink for StateStore {
    async fn save_now(&self) {
        self.save_logged().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use sea_orm::{ConnectionTrait, PaginatorTrait};
    use serde_json::json;

    use super::*;
    use crate::application::handlers::{CentralSystem, CentralSystemHandler, HandlerSettings};
    use crate::application::registry::ChargePointRegistry;
    use crate::domain::{ChargePointState, ChargePointStatus, Transaction};
    use crate::infrastructure::database::{init_database, DatabaseConfig};

    async fn memory_db() -> DatabaseConnection {
        init_database(&DatabaseConfig::in_memory()).await.unwrap()
    }

    async fn store_on(db: &DatabaseConnection) -> StateStore {
        let store = StateStore::new(db.clone(), ChargePointRegistry::shared(), Duration::from_secs(30));
        store.init().await.unwrap();
        store
    }

    async fn round_trip(store: &StateStore) -> SharedRegistry {
        store.save().await.unwrap();
        let fresh = StateStore::new(store.db.clone(), ChargePointRegistry::shared(), store.interval);
        assert!(fresh.restore().await.unwrap());
        fresh.registry
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        store.init().await.unwrap();
        assert!(!store.restore().await.unwrap());
        assert!(store.registry.is_empty());
    }

    #[tokio::test]
    async fn empty_registry_round_trips() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        let restored = round_trip(&store).await;
        assert!(restored.is_empty());
        assert_eq!(restored.next_transaction_id(), 0);
    }

    #[tokio::test]
    async fn device_without_connectors_round_trips() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        store.registry.connect("CP1");
        let restored = round_trip(&store).await;
        assert_eq!(restored.get("CP1"), Some(ChargePointState::new()));
    }

    #[tokio::test]
    async fn mixed_fleet_round_trips() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        let registry = &store.registry;
        for (cp, connectors) in [("CP1", 2u32), ("CP2", 3u32)] {
            registry.connect(cp);
            registry
                .update(cp, |state| {
                    state.status = Some(ChargePointStatus::Available);
                    for connector_id in 1..=connectors {
                        state
                            .start_transaction(
                                connector_id,
                                || registry.allocate_transaction_id(),
                                |id| Transaction::new(id, connector_id, "TAG", 10, Utc::now()),
                            )
                            .unwrap();
                    }
                    let first = *state.transactions.keys().next().unwrap();
                    let tx = state.transactions.get_mut(&first).unwrap();
                    tx.stop(Utc::now(), 90, Some("Local".into())).unwrap();
                    state.release_connector(1, first);
                })
                .unwrap();
        }

        let restored = round_trip(&store).await;
        assert_eq!(restored.snapshot(), registry.snapshot());
        assert_eq!(restored.allocate_transaction_id().unwrap(), 5);
    }

    #[tokio::test]
    async fn walkthrough_survives_restart() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        let system = CentralSystem::new(store.registry.clone(), HandlerSettings::default());
        store.registry.connect("CP1");

        let status = serde_json::from_value(json!({"connectorId": 1, "errorCode": "NoError", "status": "Available"})).unwrap();
        system.on_status_notification("CP1", status).unwrap();
        let start = serde_json::from_value(json!({
            "connectorId": 1, "idTag": "TAG1", "meterStart": 100, "timestamp": "2024-01-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(system.on_start_transaction("CP1", start).unwrap().transaction_id, 0);
        let stop = serde_json::from_value(json!({
            "transactionId": 0, "meterStop": 150, "timestamp": "2024-01-01T11:00:00Z"
        }))
        .unwrap();
        system.on_stop_transaction("CP1", stop).unwrap();

        let restored = round_trip(&store).await;
        let cp = restored.get("CP1").unwrap();
        assert_eq!(cp.transaction(0).unwrap().meter_stop, Some(150));
        assert!(cp.connector(1).unwrap().active_transaction.is_none());
        assert_eq!(restored.allocate_transaction_id().unwrap(), 1);
    }

    #[tokio::test]
    async fn save_keeps_a_single_row() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        store.save().await.unwrap();
        store.registry.connect("CP1");
        store.save().await.unwrap();
        assert_eq!(state::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_an_error() {
        let db = memory_db().await;
        let store = store_on(&db).await;
        db.execute_unprepared("INSERT INTO state (key, value) VALUES ('chargepoints', '{not json')")
            .await
            .unwrap();
        let err = store.restore().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn run_flushes_on_shutdown() {
        let db = memory_db().await;
        let store = Arc::new(StateStore::new(
            db.clone(),
            ChargePointRegistry::shared(),
            Duration::from_millis(20),
        ));
        store.init().await.unwrap();
        store.registry.connect("CP1");

        let shutdown = ShutdownSignal::new();
        let task = {
            let store = store.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { store.run(shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.registry.connect("CP2");
        shutdown.trigger();
        task.await.unwrap();

        let fresh = StateStore::new(db, ChargePointRegistry::shared(), Duration::from_secs(30));
        assert!(fresh.restore().await.unwrap());
        assert_eq!(fresh.registry.ids(), vec!["CP1".to_string(), "CP2".to_string()]);
    }
}
