//! Sketchrelay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: port 3001, storage under ./.rooms and ./.assets
//! sketchrelay
//!
//! # Store snapshots and assets under one data directory
//! sketchrelay --data-dir /var/lib/sketchrelay
//! ```
//!
//! Retention and port are controlled by environment variables: `PORT`,
//! `ROOM_RETENTION_DAYS`, `ASSET_RETENTION_DAYS`, `CLEANUP_INTERVAL_HOURS`,
//! `CLEANUP_ENABLED`.

use clap::Parser;
use sketchrelay::{Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sketchrelay collaboration server
#[derive(Parser, Debug)]
#[command(name = "sketchrelay")]
#[command(about = "Real-time collaboration backend for the sketchrelay canvas")]
#[command(version)]
struct Args {
    /// Root directory for room snapshots and assets
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).with(filter).init();

    let mut config = ServerConfig::from_env();
    if let Some(data_dir) = args.data_dir {
        config = config.with_data_dir(data_dir);
    }

    tracing::info!("sketchrelay server starting");
    tracing::info!(
        port = config.port,
        rooms_dir = %config.rooms_dir.display(),
        assets_dir = %config.assets_dir.display(),
        cleanup_enabled = config.sweep_enabled,
        "configuration loaded"
    );

    let server = Server::bind(config).await?;
    tracing::info!("listening on {}", server.local_addr()?);

    server.run().await?;

    tracing::info!("sketchrelay server stopped");
    Ok(())
}
