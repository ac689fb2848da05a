//! Observability endpoints: health, room and asset listings, process
//! stats. Payload shapes are part of the external contract; field names
//! are camelCase and timestamps are ISO-8601.

use std::time::SystemTime;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::store::{SnapshotStore, StoreEntry};

/// A room file is "active" while its snapshot was touched within 24h.
const ACTIVE_WINDOW_SECS: u64 = 24 * 3600;
/// RSS above this threshold flips the memory check to "warning".
const MEMORY_WARN_BYTES: u64 = 1536 * 1024 * 1024;

fn iso(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /api/health`
pub async fn api_health<S: SnapshotStore>(State(state): State<AppState<S>>) -> Response {
    let active = state.engine.total_sessions().await;

    let (memory_status, memory_details, memory_warning) = match process_rss_bytes() {
        Some(rss) if rss > MEMORY_WARN_BYTES => (
            "warning",
            json!({ "rssBytes": rss }),
            Some("resident set size above threshold".to_string()),
        ),
        Some(rss) => ("healthy", json!({ "rssBytes": rss }), None),
        None => ("healthy", json!({ "rssBytes": null }), None),
    };

    let (storage_status, storage_details) =
        match (state.store.list_rooms(), state.store.list_assets()) {
            (Ok(rooms), Ok(assets)) => {
                ("healthy", json!({ "rooms": rooms.len(), "assets": assets.len() }))
            },
            (Err(e), _) | (_, Err(e)) => ("unhealthy", json!({ "error": e.to_string() })),
        };

    let status = if storage_status == "unhealthy" {
        "unhealthy"
    } else if memory_status == "warning" {
        "warning"
    } else {
        "healthy"
    };

    let mut memory = json!({ "status": memory_status, "details": memory_details });
    if let Some(warning) = memory_warning {
        memory["warning"] = json!(warning);
    }

    Json(json!({
        "status": status,
        "timestamp": iso_now(),
        "uptime": state.started_at.elapsed().as_secs(),
        "checks": {
            "memory": memory,
            "connections": {
                "status": "healthy",
                "details": { "active": active },
            },
            "storage": {
                "status": storage_status,
                "details": storage_details,
            },
        },
    }))
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomListing {
    total_rooms: usize,
    active_rooms: usize,
    storage_used: u64,
    rooms: Vec<RoomItem>,
    last_updated: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomItem {
    name: String,
    size: u64,
    last_modified: String,
    is_active: bool,
}

/// `GET /api/rooms` - snapshot listing, newest first.
pub async fn api_rooms<S: SnapshotStore>(State(state): State<AppState<S>>) -> Response {
    let mut entries = match state.store.list_rooms() {
        Ok(entries) => entries,
        Err(e) => return listing_failure("rooms", &e.to_string()),
    };
    entries.sort_by(|a, b| b.mtime.cmp(&a.mtime));

    let now = SystemTime::now();
    let storage_used = entries.iter().map(|e| e.size).sum();
    let rooms: Vec<RoomItem> = entries
        .into_iter()
        .map(|entry| {
            let is_active = age_secs(now, &entry) < ACTIVE_WINDOW_SECS;
            RoomItem {
                name: entry.id,
                size: entry.size,
                last_modified: iso(entry.mtime),
                is_active,
            }
        })
        .collect();

    let active_rooms = rooms.iter().filter(|r| r.is_active).count();
    Json(RoomListing {
        total_rooms: rooms.len(),
        active_rooms,
        storage_used,
        rooms,
        last_updated: iso_now(),
    })
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetListing {
    total_assets: usize,
    storage_used: u64,
    assets: Vec<AssetItem>,
    last_updated: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetItem {
    name: String,
    size: u64,
    last_modified: String,
}

/// `GET /api/assets` - asset listing, largest first.
pub async fn api_assets<S: SnapshotStore>(State(state): State<AppState<S>>) -> Response {
    let mut entries = match state.store.list_assets() {
        Ok(entries) => entries,
        Err(e) => return listing_failure("assets", &e.to_string()),
    };
    entries.sort_by(|a, b| b.size.cmp(&a.size));

    let storage_used = entries.iter().map(|e| e.size).sum();
    let assets: Vec<AssetItem> = entries
        .into_iter()
        .map(|entry| AssetItem {
            name: entry.id,
            size: entry.size,
            last_modified: iso(entry.mtime),
        })
        .collect();

    Json(AssetListing {
        total_assets: assets.len(),
        storage_used,
        assets,
        last_updated: iso_now(),
    })
    .into_response()
}

/// `GET /api/stats` - process and runtime stats.
pub async fn api_stats<S: SnapshotStore>(State(state): State<AppState<S>>) -> Response {
    Json(json!({
        "uptime": state.started_at.elapsed().as_secs(),
        "memoryUsage": { "rssBytes": process_rss_bytes() },
        "nodeOrRuntimeVersion": concat!("sketchrelay/", env!("CARGO_PKG_VERSION")),
        "platform": std::env::consts::OS,
        "pid": std::process::id(),
        "activeConnections": state.engine.total_sessions().await,
        "environment": {
            "port": state.config.port,
            "roomsDir": state.config.rooms_dir.display().to_string(),
            "assetsDir": state.config.assets_dir.display().to_string(),
            "cleanupEnabled": state.config.sweep_enabled,
        },
        "lastUpdated": iso_now(),
    }))
    .into_response()
}

fn age_secs(now: SystemTime, entry: &StoreEntry) -> u64 {
    now.duration_since(entry.mtime).map(|d| d.as_secs()).unwrap_or(0)
}

fn listing_failure(what: &str, reason: &str) -> Response {
    tracing::error!(what, reason, "listing failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "storage failure" })))
        .into_response()
}

/// Resident set size of this process, where the platform exposes it.
fn process_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(rss_pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
