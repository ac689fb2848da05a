//! Session gateway: WebSocket upgrades on `/connect/{roomId}`.
//!
//! The gateway derives the session id, acquires the room, and binds the
//! socket. The socket sink is shared behind a mutex between the broadcast
//! forwarder and the keepalive pinger; the read loop runs on the upgrade
//! task and feeds frames into the engine.
//!
//! Close codes the gateway sends itself: 1008 for a missing/invalid room
//! id, 1011 for an internal failure (acquiring the room, or the room
//! closing underneath a live session), 1002 for a session that sent a
//! malformed protocol frame.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};

use crate::{
    api::AppState,
    error::EngineError,
    store::{SnapshotStore, StoreError},
};

/// Policy violation: missing or invalid room id.
const CLOSE_POLICY: u16 = 1008;
/// Internal error while acquiring the room.
const CLOSE_INTERNAL: u16 = 1011;
/// The session sent a frame the protocol rejects.
const CLOSE_PROTOCOL: u16 = 1002;

/// Query parameters accepted on the connect path.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Client-supplied session id; synthesized when absent.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Accept a WebSocket upgrade for a room.
pub async fn ws_handler<S: SnapshotStore>(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState<S>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, params.session_id, state))
}

/// Session ids are unique within the process and distinguishable in logs:
/// a monotonic counter plus a short random token.
fn derive_session_id(provided: Option<String>) -> String {
    match provided {
        Some(id) if !id.is_empty() => id,
        _ => {
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
            let mut token = [0u8; 4];
            getrandom::fill(&mut token).expect("OS RNG failure is unrecoverable");
            format!("session-{seq}-{:02x}{:02x}{:02x}{:02x}", token[0], token[1], token[2], token[3])
        },
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
}

/// Close an already-split socket through the shared sink.
async fn send_close(
    ws_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    code: u16,
    reason: &'static str,
) {
    let mut sink = ws_tx.lock().await;
    let _ = sink.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
}

async fn handle_socket<S: SnapshotStore>(
    socket: WebSocket,
    room_id: String,
    session_id: Option<String>,
    state: AppState<S>,
) {
    if room_id.trim().is_empty() {
        close_with(socket, CLOSE_POLICY, "missing room id").await;
        return;
    }

    let session_id = derive_session_id(session_id);

    let room = match state.engine.obtain_room(&room_id).await {
        Ok(room) => room,
        Err(EngineError::Store(StoreError::InvalidId(_))) => {
            tracing::warn!(%room_id, %session_id, "room id rejected");
            close_with(socket, CLOSE_POLICY, "invalid room id").await;
            return;
        },
        Err(e) => {
            tracing::error!(%room_id, %session_id, error = %e, "failed to acquire room");
            close_with(socket, CLOSE_INTERNAL, "internal error").await;
            return;
        },
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<bytes::Bytes>();
    if let Err(e) = state.engine.attach_session(&room, &session_id, tx) {
        tracing::warn!(%room_id, %session_id, error = %e, "attach refused");
        close_with(socket, CLOSE_INTERNAL, "room closed").await;
        return;
    }

    tracing::info!(%room_id, %session_id, "client connected");

    let (ws_tx, mut ws_rx) = socket.split();
    let ws_tx = Arc::new(Mutex::new(ws_tx));

    // Forwarder: drains the session's outbound queue in order.
    let forward_task = {
        let ws_tx = Arc::clone(&ws_tx);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let mut sink = ws_tx.lock().await;
                if sink.send(Message::Binary(payload)).await.is_err() {
                    return;
                }
            }
        })
    };

    // Keepalive: pong tracking is advisory only; TCP keepalive and the
    // session registry are the actual liveness arbiters.
    let ping_task = spawn_ping_task(Arc::clone(&ws_tx), state.config.ping_interval);

    let mut close_code: Option<u16> = None;
    let mut close_reason = String::new();

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                match state.engine.apply_message(&room, &session_id, &data) {
                    Ok(()) => {},
                    Err(EngineError::Protocol(reason)) => {
                        tracing::warn!(%room_id, %session_id, %reason, "protocol fault, dropping session");
                        send_close(&ws_tx, CLOSE_PROTOCOL, "protocol error").await;
                        break;
                    },
                    Err(EngineError::RoomClosed(_)) => {
                        // Shutdown or eviction can close the room while
                        // this read loop is still live.
                        tracing::warn!(%room_id, %session_id, "room closed underneath session");
                        send_close(&ws_tx, CLOSE_INTERNAL, "internal error").await;
                        break;
                    },
                    Err(e) => {
                        tracing::warn!(%room_id, %session_id, error = %e, "message rejected");
                        send_close(&ws_tx, CLOSE_INTERNAL, "internal error").await;
                        break;
                    },
                }
            },
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    close_code = Some(frame.code);
                    close_reason = frame.reason.to_string();
                }
                break;
            },
            Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => {},
            Ok(Message::Text(_)) => {
                tracing::debug!(%room_id, %session_id, "ignoring text frame");
            },
            Err(e) => {
                close_reason = e.to_string();
                break;
            },
        }
    }

    forward_task.abort();
    ping_task.abort();
    state.engine.session_removed(&room, &session_id);

    tracing::info!(
        %room_id,
        %session_id,
        code = close_code.map(i64::from).unwrap_or(-1),
        reason = %close_reason,
        "client disconnected"
    );
}

fn spawn_ping_task(
    ws_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let mut sink = ws_tx.lock().await;
            if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                return;
            }
        }
    })
}
