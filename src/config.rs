//! Server configuration.
//!
//! Operational knobs come from environment variables (`PORT`,
//! `ROOM_RETENTION_DAYS`, `ASSET_RETENTION_DAYS`, `CLEANUP_INTERVAL_HOURS`,
//! `CLEANUP_ENABLED`); the engine tunables (debounce, idle grace, tick
//! periods) are plain fields so tests can shrink them without waiting out
//! wall-clock defaults.

use std::{path::PathBuf, time::Duration};

/// Runtime configuration for the whole server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP + WebSocket listen port.
    pub port: u16,
    /// Directory holding one snapshot file per room.
    pub rooms_dir: PathBuf,
    /// Directory holding one file per uploaded asset.
    pub assets_dir: PathBuf,
    /// Debounce window between a change and its snapshot write.
    pub flush_debounce: Duration,
    /// Period of the per-room maintenance tick (backup flush + deregistration).
    pub maint_tick: Duration,
    /// Window after the last session departs during which the room stays live.
    pub idle_grace: Duration,
    /// WebSocket keepalive ping period.
    pub ping_interval: Duration,
    /// Age after which an idle room snapshot may be deleted.
    pub room_retention: Duration,
    /// Age after which an asset may be deleted.
    pub asset_retention: Duration,
    /// Period of the retention sweep.
    pub sweep_interval: Duration,
    /// Delay before the first sweep after process start.
    pub initial_sweep_delay: Duration,
    /// Whether the retention sweeper runs at all.
    pub sweep_enabled: bool,
    /// Upload size cap; larger bodies are rejected with 413.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            rooms_dir: PathBuf::from(".rooms"),
            assets_dir: PathBuf::from(".assets"),
            flush_debounce: Duration::from_millis(500),
            maint_tick: Duration::from_secs(5),
            idle_grace: Duration::from_secs(30),
            ping_interval: Duration::from_secs(30),
            room_retention: Duration::from_secs(7 * 24 * 3600),
            asset_retention: Duration::from_secs(30 * 24 * 3600),
            sweep_interval: Duration::from_secs(6 * 3600),
            initial_sweep_delay: Duration::from_secs(30),
            sweep_enabled: true,
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from the process environment.
    ///
    /// Unset or unparseable variables fall back to their defaults; the
    /// sweeper is enabled unless `CLEANUP_ENABLED` is literally `"false"`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            room_retention: env_parse::<u64>("ROOM_RETENTION_DAYS")
                .map(|days| Duration::from_secs(days * 24 * 3600))
                .unwrap_or(defaults.room_retention),
            asset_retention: env_parse::<u64>("ASSET_RETENTION_DAYS")
                .map(|days| Duration::from_secs(days * 24 * 3600))
                .unwrap_or(defaults.asset_retention),
            sweep_interval: env_parse::<u64>("CLEANUP_INTERVAL_HOURS")
                .map(|hours| Duration::from_secs(hours * 3600))
                .unwrap_or(defaults.sweep_interval),
            sweep_enabled: std::env::var("CLEANUP_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(true),
            ..defaults
        }
    }

    /// Re-root the storage directories under `data_dir`.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        self.rooms_dir = data_dir.join("rooms");
        self.assets_dir = data_dir.join("assets");
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
