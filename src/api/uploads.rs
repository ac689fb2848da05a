//! Asset upload and download handlers.
//!
//! `<id>` arrives percent-decoded from the router and is used verbatim as
//! the store key; the store rejects traversal forms before any file I/O.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::AppState;
use crate::store::{SnapshotStore, StoreError};

/// `PUT /uploads/{id}` - store raw bytes under the asset id.
///
/// Bodies over the configured cap never reach this handler; the body
/// limit layer rejects them with 413.
pub async fn put_asset<S: SnapshotStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    match state.store.write_asset(&id, &body) {
        Ok(()) => {
            tracing::debug!(asset_id = %id, bytes = body.len(), "asset stored");
            Json(json!({ "ok": true })).into_response()
        },
        Err(e) => store_error_response(&id, e),
    }
}

/// `GET /uploads/{id}` - raw bytes, 404 when absent.
pub async fn get_asset<S: SnapshotStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.read_asset(&id) {
        Ok(bytes) => {
            ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response()
        },
        Err(e) => store_error_response(&id, e),
    }
}

fn store_error_response(id: &str, err: StoreError) -> Response {
    match err {
        StoreError::NotFound(_) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
        },
        StoreError::InvalidId(_) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid asset id" }))).into_response()
        },
        StoreError::Io(reason) => {
            tracing::error!(asset_id = %id, %reason, "asset store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "storage failure" })))
                .into_response()
        },
    }
}
