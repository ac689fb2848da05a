//! HTTP surface: asset uploads, link unfurling, and observability.
//!
//! One router hosts the WebSocket connect path and the REST endpoints.
//! Every response carries permissive CORS headers; the drawing frontend is
//! served from a different origin.

mod meta;
mod uploads;

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    config::ServerConfig,
    engine::RoomEngine,
    gateway,
    store::SnapshotStore,
    unfurl::UnfurlResolver,
};

/// Shared state handed to every handler.
pub struct AppState<S: SnapshotStore> {
    /// The room engine; owns all live rooms.
    pub engine: Arc<RoomEngine<S>>,
    /// Blob store for snapshots and assets.
    pub store: S,
    /// Process configuration.
    pub config: Arc<ServerConfig>,
    /// Link preview resolver.
    pub unfurler: Arc<UnfurlResolver>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl<S: SnapshotStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            store: self.store.clone(),
            config: Arc::clone(&self.config),
            unfurler: Arc::clone(&self.unfurler),
            started_at: self.started_at,
        }
    }
}

/// Build the full application router.
pub fn router<S: SnapshotStore>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/connect/{room_id}", get(gateway::ws_handler::<S>))
        .route("/uploads/{id}", get(uploads::get_asset::<S>).put(uploads::put_asset::<S>))
        .route("/unfurl", get(unfurl_handler::<S>))
        .route("/health", get(health_text))
        .route("/api/health", get(meta::api_health::<S>))
        .route("/api/rooms", get(meta::api_rooms::<S>))
        .route("/api/assets", get(meta::api_assets::<S>))
        .route("/api/stats", get(meta::api_stats::<S>))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct UnfurlQuery {
    url: Option<String>,
}

/// `GET /unfurl?url=…` - always 200 with the four-field tuple, except
/// when the `url` parameter itself is missing.
async fn unfurl_handler<S: SnapshotStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<UnfurlQuery>,
) -> impl IntoResponse {
    let Some(url) = query.url else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing url parameter" })))
            .into_response();
    };
    Json(state.unfurler.resolve(&url).await).into_response()
}

/// `GET /health` - plain-text liveness probe.
async fn health_text() -> &'static str {
    "OK"
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
