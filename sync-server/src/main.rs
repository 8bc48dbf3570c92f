//! fieldsync-server binary entry point.
//!
//! Usage:
//! ```bash
//! fieldsync-server --config fieldsync.toml
//! fieldsync-server --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fieldsync_server::config::Config;
use fieldsync_server::http::{build_router, health};
use fieldsync_server::maintenance::spawn_maintenance_task;
use fieldsync_server::oracle::{BiometricOracle, HttpOracle, UnavailableOracle};
use fieldsync_server::server::FieldSyncServer;
use fieldsync_server::storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "fieldsync.toml";

/// Sync and identity-matching server for fieldsync field devices.
#[derive(Parser, Debug)]
#[command(name = "fieldsync-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults apply when the default file is absent)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fieldsync_server=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(cli.config)?;

    let store = SqliteStore::new(&config.storage.database)
        .await
        .with_context(|| format!("Failed to open {}", config.storage.database.display()))?;

    let oracle: Arc<dyn BiometricOracle> = match config.matching.oracle_url.as_deref() {
        Some(url) => {
            tracing::info!("Biometric matching service: {}", url);
            Arc::new(HttpOracle::new(url))
        }
        None => {
            tracing::warn!("No biometric matching service configured; template matching disabled");
            Arc::new(UnavailableOracle)
        }
    };

    let bind_address = config.server.bind_address.clone();
    let refresh_secs = config.sync.location_refresh_secs;
    let server = Arc::new(
        FieldSyncServer::new(config, Arc::new(store), oracle)
            .await
            .context("Failed to start server")?,
    );

    let _maintenance = spawn_maintenance_task(
        server.directory(),
        server.rate_limits().clone(),
        refresh_secs,
    );

    health::init_start_time();
    let app = build_router(server);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    tracing::info!("fieldsync-server v{} listening on {}", env!("CARGO_PKG_VERSION"), bind_address);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(&path)?),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if default.exists() {
                Ok(Config::from_file(&default)?)
            } else {
                tracing::info!("No {} found, using defaults", DEFAULT_CONFIG);
                Ok(Config::default())
            }
        }
    }
}
