//! Router-level tests for the REST surface: uploads, listings, health,
//! unfurl parameter handling, CORS, and the 404 fallback.

use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sketchrelay::{api, AppState, MemoryStore, RoomEngine, ServerConfig, SnapshotStore, UnfurlResolver};
use tower::ServiceExt;

fn test_app(config: ServerConfig) -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let config = Arc::new(config);
    let engine = Arc::new(RoomEngine::new(store.clone(), Arc::clone(&config)));
    let state = AppState {
        engine,
        store: store.clone(),
        config,
        unfurler: Arc::new(UnfurlResolver::new()),
        started_at: Instant::now(),
    };
    (api::router(state), store)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn put_then_get_returns_the_same_bytes() {
    let (app, _store) = test_app(ServerConfig::default());
    let payload = b"\x89PNG\r\n\x1a\nrest-of-image".to_vec();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/uploads/img-abc123")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));

    let response = app
        .oneshot(Request::builder().uri("/uploads/img-abc123").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn missing_asset_is_404() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/uploads/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn traversal_asset_id_is_rejected() {
    let (app, store) = test_app(ServerConfig::default());

    // Percent-encoded "../escape"; axum decodes before the handler sees it.
    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/uploads/..%2Fescape")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.list_assets().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let (app, _store) = test_app(ServerConfig {
        max_upload_bytes: 16,
        ..ServerConfig::default()
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/uploads/too-big")
                .body(Body::from(vec![0u8; 64]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn health_is_plain_ok() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), b"OK");
}

#[tokio::test]
async fn api_health_reports_checks() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["connections"]["details"]["active"], 0);
    assert_eq!(json["checks"]["storage"]["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn api_rooms_sorts_newest_first_and_counts_active() {
    let (app, store) = test_app(ServerConfig::default());
    store.write_room("old-room", b"1234").unwrap();
    store.set_room_mtime(
        "old-room",
        std::time::SystemTime::now() - std::time::Duration::from_secs(48 * 3600),
    );
    store.write_room("new-room", b"123456").unwrap();

    let response = app
        .oneshot(Request::builder().uri("/api/rooms").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;

    assert_eq!(json["totalRooms"], 2);
    assert_eq!(json["activeRooms"], 1);
    assert_eq!(json["storageUsed"], 10);
    assert_eq!(json["rooms"][0]["name"], "new-room");
    assert_eq!(json["rooms"][0]["isActive"], true);
    assert_eq!(json["rooms"][1]["name"], "old-room");
    assert_eq!(json["rooms"][1]["isActive"], false);
}

#[tokio::test]
async fn api_assets_sorts_by_size_descending() {
    let (app, store) = test_app(ServerConfig::default());
    store.write_asset("small", b"1").unwrap();
    store.write_asset("large", b"123456789").unwrap();

    let response = app
        .oneshot(Request::builder().uri("/api/assets").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;

    assert_eq!(json["totalAssets"], 2);
    assert_eq!(json["storageUsed"], 10);
    assert_eq!(json["assets"][0]["name"], "large");
    assert_eq!(json["assets"][1]["name"], "small");
}

#[tokio::test]
async fn api_stats_reports_process_facts() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/api/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;

    assert_eq!(json["activeConnections"], 0);
    assert_eq!(json["pid"], u64::from(std::process::id()));
    assert!(json["nodeOrRuntimeVersion"].as_str().unwrap().starts_with("sketchrelay/"));
    assert!(json["environment"]["cleanupEnabled"].is_boolean());
}

#[tokio::test]
async fn unfurl_without_url_is_400() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/unfurl").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unfurl_failure_is_200_with_empty_tuple() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/unfurl?url=http%3A%2F%2Fdoes-not-resolve.invalid.%2F")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "title": "", "description": "", "image": "", "favicon": "" })
    );
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/definitely/not/here").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn responses_carry_permissive_cors() {
    let (app, _store) = test_app(ServerConfig::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("origin", "https://canvas.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").map(|v| v.to_str().unwrap()),
        Some("*")
    );
}
