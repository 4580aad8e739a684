//! OCPP Central System: CLI server
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-central/config.toml)
//! ocpp-central
//!
//! # Custom config path
//! ocpp-central --config /etc/ocpp-central/config.toml
//!
//! # Override ports
//! ocpp-central --api-port 8080 --ws-port 8887
//!
//! # Validate config without starting
//! ocpp-central --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use ocpp_central::config::{default_config_path, AppConfig};
use ocpp_central::server::{init_tracing, ServerHandle};

/// OCPP 1.6 central system for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-central",
    version,
    about = "OCPP 1.6 central system with persistent charge point state",
    long_about = "WebSocket server for OCPP 1.6 charge points plus an HTTP control \
                  surface (status page, REST API, Prometheus metrics).\n\n\
                  Default config: ~/.config/ocpp-central/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the control surface listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let loaded = AppConfig::load(&config_path);

    let mut config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => AppConfig::default(),
    };
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }

    // Init tracing first so subsequent logs are formatted properly
    init_tracing(&config);
    match loaded {
        Ok(_) => info!("Configuration loaded from {}", config_path.display()),
        Err(e) => {
            error!("{}", e);
            if cli.check {
                return Err(e.into());
            }
            error!("Using default configuration.");
        }
    }

    // ── Apply overrides: environment, then CLI ─────────────────
    config.apply_env_overrides();
    if let Some(port) = cli.api_port {
        info!("CLI override: api_port = {}", port);
        config.server.api_port = port;
    }
    if let Some(port) = cli.ws_port {
        info!("CLI override: ws_port = {}", port);
        config.server.ws_port = port;
    }

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("✅ Configuration is valid");
        println!("   Config file       : {}", config_path.display());
        println!("   API address       : {}:{}", config.server.api_host, config.server.api_port);
        println!("   WS address        : {}:{}", config.server.ws_host, config.server.ws_port);
        println!("   Database          : {}", config.database.connection_url());
        println!("   Snapshot interval : {}s", config.persistence.interval().as_secs());
        println!("   Disconnect policy : {:?}", config.persistence.disconnect_policy);
        println!("   Log level         : {}", config.logging.level);
        return Ok(());
    }

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(config).await?;

    // Install OS signal handlers (SIGTERM, SIGINT)
    handle.install_signal_handler();

    info!("🚀 Press Ctrl+C to shutdown gracefully.");

    // Wait for shutdown signal, then clean up
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
