//! Team playback sync server (teamplay-sync) - Main entry point
//!
//! Serves the WebSocket command channel, per-team SSE streams and the REST
//! control endpoints over one shared [`TeamSyncEngine`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use teamplay_common::SystemClock;
use teamplay_sync::api::{self, AppContext};
use teamplay_sync::config::{Config, ConfigOverrides};
use teamplay_sync::db::{init_database, SqliteTeamStore};
use teamplay_sync::sync::ConnectionHub;
use teamplay_sync::TeamSyncEngine;

/// Command-line arguments for teamplay-sync
#[derive(Parser, Debug)]
#[command(name = "teamplay-sync")]
#[command(about = "Team playback and queue synchronization server")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "TEAMPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (e.g. 127.0.0.1:5750)
    #[arg(short, long, env = "TEAMPLAY_BIND")]
    bind: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "TEAMPLAY_DATABASE")]
    database: Option<PathBuf>,

    /// Store reconciliation period in seconds (0 disables)
    #[arg(long, env = "TEAMPLAY_REFRESH_INTERVAL_SECS")]
    refresh_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teamplay_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            bind: args.bind,
            database: args.database,
            refresh_interval_secs: args.refresh_interval_secs,
        },
    )
    .context("Failed to load configuration")?;

    info!("Starting teamplay-sync on {}", config.bind_addr);
    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteTeamStore::new(pool));

    let hub = Arc::new(ConnectionHub::new());
    let engine = Arc::new(TeamSyncEngine::new(
        store,
        hub.clone(),
        Arc::new(SystemClock),
    ));

    let reconciler = (config.refresh_interval_secs > 0).then(|| {
        info!(
            "Queue reconciliation every {}s",
            config.refresh_interval_secs
        );
        TeamSyncEngine::spawn_reconciler(
            engine.clone(),
            Duration::from_secs(config.refresh_interval_secs),
        )
    });

    let ctx = AppContext {
        engine: engine.clone(),
        hub,
        sse_keep_alive: Duration::from_secs(config.sse_keep_alive_secs),
    };

    api::run(config.bind_addr, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(reconciler) = reconciler {
        reconciler.abort();
    }
    engine.flush_writes().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
