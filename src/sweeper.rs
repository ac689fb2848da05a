//! Retention sweeper: bounds on-disk growth.
//!
//! Room snapshots older than the retention window are deleted unless a
//! live room still has sessions attached; assets are deleted on age alone
//! (they have no in-memory state). Per-file errors are logged and never
//! abort the sweep, and a sweep failure never crashes the process.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::task::JoinHandle;

use crate::{config::ServerConfig, engine::RoomEngine, store::SnapshotStore};

/// Start the periodic sweep. The first pass runs after the configured
/// warm-up delay, then on the steady interval.
pub fn spawn<S: SnapshotStore>(
    engine: Arc<RoomEngine<S>>,
    config: Arc<ServerConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(config.initial_sweep_delay).await;
        loop {
            sweep_once(&engine, config.room_retention, config.asset_retention).await;
            tokio::time::sleep(config.sweep_interval).await;
        }
    })
}

/// One retention pass over both keyspaces.
pub async fn sweep_once<S: SnapshotStore>(
    engine: &Arc<RoomEngine<S>>,
    room_retention: Duration,
    asset_retention: Duration,
) {
    let now = SystemTime::now();
    let mut rooms_deleted = 0usize;
    let mut assets_deleted = 0usize;

    match engine.store().list_rooms() {
        Ok(entries) => {
            for entry in entries {
                if !expired(now, entry.mtime, room_retention) {
                    continue;
                }
                // A room with live sessions keeps its snapshot regardless
                // of age.
                if engine.room_has_active_sessions(&entry.id).await {
                    tracing::debug!(room_id = %entry.id, "retention skip: sessions attached");
                    continue;
                }
                match engine.store().delete_room(&entry.id) {
                    Ok(()) => {
                        rooms_deleted += 1;
                        engine.evict_idle(&entry.id).await;
                        tracing::info!(room_id = %entry.id, "expired room snapshot deleted");
                    },
                    Err(e) => {
                        tracing::warn!(room_id = %entry.id, error = %e, "room sweep failed");
                    },
                }
            }
        },
        Err(e) => tracing::warn!(error = %e, "room listing failed, skipping room sweep"),
    }

    match engine.store().list_assets() {
        Ok(entries) => {
            for entry in entries {
                if !expired(now, entry.mtime, asset_retention) {
                    continue;
                }
                match engine.store().delete_asset(&entry.id) {
                    Ok(()) => assets_deleted += 1,
                    Err(e) => {
                        tracing::warn!(asset_id = %entry.id, error = %e, "asset sweep failed");
                    },
                }
            }
        },
        Err(e) => tracing::warn!(error = %e, "asset listing failed, skipping asset sweep"),
    }

    if rooms_deleted > 0 || assets_deleted > 0 {
        tracing::info!(rooms_deleted, assets_deleted, "retention sweep complete");
    }
}

fn expired(now: SystemTime, mtime: SystemTime, retention: Duration) -> bool {
    now.duration_since(mtime).map(|age| age > retention).unwrap_or(false)
}
