use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drover_core::{
    load_config, validate_config, MemoryTorrentStore, Orchestrator, SanitizedConfig, TorrentStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting drover {}", VERSION);

    // Determine config path
    let config_path = std::env::var("DROVER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Echo the effective configuration with secrets redacted
    let sanitized = SanitizedConfig::from(&config);
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&sanitized).unwrap_or_default()
    );

    // Compute config hash for troubleshooting across restarts
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    // Create the torrent store. Persistent storage is an external
    // collaborator; the bundled store keeps records in process memory.
    let store: Arc<dyn TorrentStore> = Arc::new(MemoryTorrentStore::new());
    info!("Torrent store initialized");

    let enabled = config.orchestrator.enabled;
    let orchestrator = Arc::new(Orchestrator::new(config, store));

    // Startup recovery: restart anything caught mid-transfer by a shutdown.
    orchestrator
        .initialize()
        .await
        .context("Orchestrator initialization failed")?;

    if enabled {
        Arc::clone(&orchestrator).start();
        info!("Orchestrator started");
    } else {
        info!("Orchestrator disabled in config, ticks must be driven manually");
    }

    shutdown_signal().await;

    info!("Shutting down...");
    orchestrator.stop().await;
    info!("Orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
