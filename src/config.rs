//! Application configuration
//!
//! Loaded from a TOML file (default `~/.config/ocpp-central/config.toml`).
//! Every field has a default, so a partial or missing file is valid.
//! `SERVER_OCPP_PORT`, `SERVER_HTTP_PORT` and `DB_PATH` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::control::ControlSettings;
use crate::application::handlers::HandlerSettings;
use crate::application::lifecycle::DisconnectPolicy;
use crate::infrastructure::DatabaseConfig;

const APP_DIR: &str = "ocpp-central";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

fn default_database_path() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("ocpp.db")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub central_system: CentralSystemConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub ws_host: String,
    pub ws_port: u16,
    pub api_host: String,
    pub api_port: u16,
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: "0.0.0.0".to_string(),
            ws_port: 8887,
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite database file
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
        }
    }
}

impl DatabaseSettings {
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::sqlite(&self.path, self.max_connections)
    }

    pub fn connection_url(&self) -> String {
        self.database_config().url
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Seconds between periodic snapshot saves
    pub interval_secs: u64,
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            disconnect_policy: DisconnectPolicy::default(),
        }
    }
}

impl PersistenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralSystemConfig {
    pub heartbeat_interval: u16,
    pub auto_register_on_boot: bool,
}

impl Default for CentralSystemConfig {
    fn default() -> Self {
        let defaults = HandlerSettings::default();
        Self {
            heartbeat_interval: defaults.heartbeat_interval,
            auto_register_on_boot: defaults.auto_register_on_boot,
        }
    }
}

impl From<&CentralSystemConfig> for HandlerSettings {
    fn from(c: &CentralSystemConfig) -> Self {
        Self {
            heartbeat_interval: c.heartbeat_interval,
            auto_register_on_boot: c.auto_register_on_boot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Seconds to wait for a charge point to confirm a remote command
    pub command_timeout_secs: u64,
    /// Id tag sent with RemoteStartTransaction
    pub remote_id_tag: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            remote_id_tag: "1".to_string(),
        }
    }
}

impl From<&ControlConfig> for ControlSettings {
    fn from(c: &ControlConfig) -> Self {
        Self {
            command_timeout: Duration::from_secs(c.command_timeout_secs),
            remote_id_tag: c.remote_id_tag.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. `info` or `ocpp_central=debug`
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; unparsable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = port_override(&lookup, "SERVER_OCPP_PORT") {
            self.server.ws_port = port;
        }
        if let Some(port) = port_override(&lookup, "SERVER_HTTP_PORT") {
            self.server.api_port = port;
        }
        if let Some(path) = lookup("DB_PATH").filter(|p| !p.trim().is_empty()) {
            info!(path = path.as_str(), "Environment override: DB_PATH");
            self.database.path = PathBuf::from(path);
        }
    }
}

fn port_override(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u16> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u16>() {
        Ok(port) => {
            info!(key, port, "Environment override");
            Some(port)
        }
        Err(e) => {
            warn!(key, value = raw.as_str(), error = %e, "Ignoring invalid port override");
            None
        }
    }
}
