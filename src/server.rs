//! Reusable OCPP Central System server runtime.
//!
//! Provides [`ServerHandle`] that encapsulates the full server lifecycle:
//! database init, snapshot restore, OCPP WebSocket server, control surface,
//! periodic snapshot loop, metrics, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sea_orm::DatabaseConnection;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::{create_api_router, ApiState};
use crate::application::commands::SharedCommandPort;
use crate::application::control::{ControlSettings, RemoteControl};
use crate::application::handlers::{CentralSystem, HandlerSettings, SharedHandler};
use crate::application::lifecycle::ConnectionLifecycle;
use crate::application::ports::SharedSnapshotSink;
use crate::application::registry::{ChargePointRegistry, SharedRegistry};
use crate::config::AppConfig;
use crate::infrastructure::{init_database, StateStore};
use crate::interfaces::ws::{OcppEngine, OcppServer, SessionRegistry, SharedSessionRegistry};
use crate::support::shutdown::{listen_for_shutdown_signals, ShutdownSignal};

/// Handle to a running OCPP Central System.
///
/// # Examples
///
/// ```rust,no_run
/// use ocpp_central::config::AppConfig;
/// use ocpp_central::server::ServerHandle;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(AppConfig::default()).await?;
///     // ... wait for shutdown signal ...
///     handle.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    /// Live charge point state.
    pub registry: SharedRegistry,
    /// Active WebSocket sessions.
    pub sessions: SharedSessionRegistry,
    /// Remote control surface.
    pub control: Arc<RemoteControl>,
    /// The configuration the server was started with.
    pub config: AppConfig,
    /// Address the control surface is listening on.
    pub api_addr: SocketAddr,
    /// Address the OCPP WebSocket server is listening on.
    pub ws_addr: SocketAddr,

    db: DatabaseConnection,
    shutdown: ShutdownSignal,
    ws_task: JoinHandle<()>,
    api_task: JoinHandle<()>,
    store_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Start the OCPP Central System.
    ///
    /// This will:
    /// 1. Install the Prometheus metrics recorder
    /// 2. Connect to the database and create the schema
    /// 3. Restore the registry from the last snapshot (an unreadable snapshot aborts startup)
    /// 4. Start the OCPP WebSocket server
    /// 5. Start the control surface (status page, REST API, Swagger UI)
    /// 6. Start the periodic snapshot loop
    pub async fn start(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Starting OCPP Central System...");

        let prometheus_handle = prometheus_handle();

        // ── Database ───────────────────────────────────────────
        if let Some(dir) = config.database.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let db = init_database(&config.database.database_config()).await?;

        // ── Registry & snapshot store ──────────────────────────
        let registry = ChargePointRegistry::shared();
        let store = Arc::new(StateStore::new(
            db.clone(),
            registry.clone(),
            config.persistence.interval(),
        ));
        store.init().await?;
        if let Err(e) = store.restore().await {
            error!(error = %e, "Stored snapshot is unreadable, refusing to start");
            return Err(e.into());
        }

        // ── Protocol engine & application services ─────────────
        let control_settings = ControlSettings::from(&config.control);
        let handler: SharedHandler = Arc::new(CentralSystem::new(
            registry.clone(),
            HandlerSettings::from(&config.central_system),
        ));
        let sessions = SessionRegistry::shared();
        let engine = Arc::new(OcppEngine::new(
            sessions.clone(),
            handler.clone(),
            control_settings.command_timeout,
        ));
        let commands: SharedCommandPort = engine.clone();
        let snapshots: SharedSnapshotSink = store.clone();
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            registry.clone(),
            handler,
            commands.clone(),
            Some(snapshots),
            config.persistence.disconnect_policy,
        ));
        let control = Arc::new(RemoteControl::new(registry.clone(), commands, control_settings));

        let shutdown = ShutdownSignal::new();

        // ── OCPP WebSocket server ──────────────────────────────
        let ws_listener =
            TcpListener::bind((config.server.ws_host.as_str(), config.server.ws_port)).await?;
        let ws_addr = ws_listener.local_addr()?;
        let server = OcppServer::new(engine, lifecycle);
        let ws_shutdown = shutdown.clone();
        let ws_task = tokio::spawn(async move {
            server.run(ws_listener, ws_shutdown).await;
        });

        // ── Control surface ────────────────────────────────────
        let api_listener =
            TcpListener::bind((config.server.api_host.as_str(), config.server.api_port)).await?;
        let api_addr = api_listener.local_addr()?;
        let router = create_api_router(ApiState::new(control.clone(), sessions.clone()), prometheus_handle);
        info!("Control surface listening on http://{}", api_addr);
        info!("Swagger UI available at http://{}/docs", api_addr);

        let api_shutdown = shutdown.clone();
        let api_task = tokio::spawn(async move {
            let served = axum::serve(api_listener, router)
                .with_graceful_shutdown(async move {
                    api_shutdown.wait().await;
                    info!("🛑 Control surface received shutdown signal");
                })
                .await;
            if let Err(e) = served {
                error!("Control surface error: {}", e);
            }
        });

        // ── Snapshot loop ──────────────────────────────────────
        let store_shutdown = shutdown.clone();
        let store_task = tokio::spawn(async move {
            store.run(store_shutdown).await;
        });

        info!("🚀 All servers started.");

        Ok(Self {
            registry,
            sessions,
            control,
            config,
            api_addr,
            ws_addr,
            db,
            shutdown,
            ws_task,
            api_task,
            store_task,
        })
    }

    /// Get a cloneable shutdown signal.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Trigger shutdown on SIGTERM or Ctrl+C.
    pub fn install_signal_handler(&self) {
        tokio::spawn(listen_for_shutdown_signals(self.shutdown.clone()));
    }

    /// Trigger graceful shutdown (non-blocking).
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Wait for every task to stop after shutdown has been triggered.
    ///
    /// The snapshot loop performs its final save before this returns, unless
    /// `server.shutdown_timeout` expires first.
    pub async fn wait(self) {
        info!("⏳ Waiting for server tasks to complete...");
        let limit = Duration::from_secs(self.config.server.shutdown_timeout);
        let tasks = [
            ("WebSocket server", self.ws_task),
            ("Control surface", self.api_task),
            ("Snapshot loop", self.store_task),
        ];
        for (name, task) in tasks {
            match tokio::time::timeout(limit, task).await {
                Ok(Ok(())) => info!("{} stopped", name),
                Ok(Err(e)) => error!("{} task panicked: {}", name, e),
                Err(_) => warn!("{} did not stop within {:?}", name, limit),
            }
        }

        if let Err(e) = self.db.close().await {
            warn!("Error closing database connection: {}", e);
        } else {
            info!("✅ Database connection closed");
        }

        info!("👋 OCPP Central System shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down OCPP Central System...");
        self.trigger_shutdown();
        self.wait().await;
    }

    /// Check if the server is still running.
    pub fn is_running(&self) -> bool {
        !self.ws_task.is_finished() || !self.api_task.is_finished()
    }
}

/// The global metrics recorder can only be installed once per process;
/// later starts in the same process reuse it.
fn prometheus_handle() -> Option<PrometheusHandle> {
    static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
    PROM_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("📊 Prometheus metrics recorder installed");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
                None
            }
        })
        .clone()
}

/// Initialize tracing (logging) from the application config.
///
/// `RUST_LOG` takes precedence over `logging.level`. Call once at process
/// startup, before [`ServerHandle::start`].
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(db_path: std::path::PathBuf) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.ws_host = "127.0.0.1".into();
        config.server.ws_port = 0;
        config.server.api_host = "127.0.0.1".into();
        config.server.api_port = 0;
        config.server.shutdown_timeout = 5;
        config.database.path = db_path;
        config.database.max_connections = 1;
        config
    }

    fn temp_db(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ocpp-central-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("state.db")
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let path = temp_db("restart");

        let handle = ServerHandle::start(test_config(path.clone())).await.unwrap();
        assert_ne!(handle.ws_addr.port(), 0);
        handle.registry.connect("CP1");
        handle.registry.allocate_transaction_id().unwrap();
        handle.shutdown().await;

        let handle = ServerHandle::start(test_config(path.clone())).await.unwrap();
        assert!(handle.registry.contains("CP1"));
        assert_eq!(handle.registry.next_transaction_id(), 1);
        handle.shutdown().await;

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
