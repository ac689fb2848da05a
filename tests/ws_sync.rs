//! End-to-end WebSocket tests: a real listener, real client sockets, and
//! the Yjs sync protocol over binary frames.

use std::{sync::Arc, time::Instant};

use futures_util::{SinkExt, StreamExt};
use sketchrelay::{api, AppState, MemoryStore, RoomEngine, ServerConfig, UnfurlResolver};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use yrs::{
    sync::{Message as SyncProtoMessage, SyncMessage},
    updates::{decoder::Decode, encoder::Encode},
    Doc, Map, ReadTxn, StateVector, Transact, Update,
};

async fn start_server(config: ServerConfig) -> std::net::SocketAddr {
    let store = MemoryStore::new();
    let config = Arc::new(config);
    let engine = Arc::new(RoomEngine::new(store.clone(), Arc::clone(&config)));
    let state = AppState {
        engine,
        store,
        config,
        unfurler: Arc::new(UnfurlResolver::new()),
        started_at: Instant::now(),
    };
    let router = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn shape_update_frame(key: &str, value: &str) -> Vec<u8> {
    let doc = Doc::new();
    let shapes = doc.get_or_insert_map("shapes");
    let mut txn = doc.transact_mut();
    shapes.insert(&mut txn, key, value);
    drop(txn);
    let update = doc.transact().encode_state_as_update_v1(&StateVector::default());
    SyncProtoMessage::Sync(SyncMessage::Update(update)).encode_v1()
}

/// Read frames until a binary one arrives.
async fn next_binary(
    ws: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
          + Unpin),
) -> Vec<u8> {
    loop {
        match ws.next().await.expect("socket open").expect("frame ok") {
            Message::Binary(data) => return data.to_vec(),
            Message::Ping(_) | Message::Pong(_) => {},
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn fresh_client_receives_prior_changes_through_sync() {
    let addr = start_server(ServerConfig::default()).await;

    // Client A joins and pushes a change.
    let (mut ws_a, _) =
        connect_async(format!("ws://{addr}/connect/beta?sessionId=client-a")).await.unwrap();
    let handshake = next_binary(&mut ws_a).await;
    assert!(matches!(
        SyncProtoMessage::decode_v1(&handshake).unwrap(),
        SyncProtoMessage::Sync(SyncMessage::SyncStep1(_))
    ));
    ws_a.send(Message::Binary(shape_update_frame("rect-1", "blue"))).await.unwrap();

    // Give the room a moment to integrate the update.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    // Client C joins fresh and requests everything it is missing.
    let (mut ws_c, _) = connect_async(format!("ws://{addr}/connect/beta")).await.unwrap();
    let _handshake = next_binary(&mut ws_c).await;
    let step1 = SyncProtoMessage::Sync(SyncMessage::SyncStep1(StateVector::default())).encode_v1();
    ws_c.send(Message::Binary(step1)).await.unwrap();

    let reply = loop {
        let frame = next_binary(&mut ws_c).await;
        match SyncProtoMessage::decode_v1(&frame).unwrap() {
            SyncProtoMessage::Sync(SyncMessage::SyncStep2(update)) => break update,
            _ => continue,
        }
    };

    let local = Doc::new();
    let shapes = local.get_or_insert_map("shapes");
    local.transact_mut().apply_update(Update::decode_v1(&reply).unwrap()).unwrap();
    let txn = local.transact();
    assert_eq!(shapes.len(&txn), 1);
    assert!(shapes.get(&txn, "rect-1").is_some());
}

#[tokio::test]
async fn update_is_broadcast_to_the_other_client() {
    let addr = start_server(ServerConfig::default()).await;

    let (mut ws_a, _) =
        connect_async(format!("ws://{addr}/connect/gamma?sessionId=a")).await.unwrap();
    let _ = next_binary(&mut ws_a).await;
    let (mut ws_b, _) =
        connect_async(format!("ws://{addr}/connect/gamma?sessionId=b")).await.unwrap();
    let _ = next_binary(&mut ws_b).await;

    let frame = shape_update_frame("rect-9", "red");
    ws_a.send(Message::Binary(frame.clone())).await.unwrap();

    let received = next_binary(&mut ws_b).await;
    assert_eq!(received, frame);
}

#[tokio::test]
async fn blank_room_id_is_closed_with_policy_code() {
    let addr = start_server(ServerConfig::default()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/connect/%20")).await.unwrap();
    loop {
        match ws.next().await.expect("frame").expect("ok") {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1008);
                break;
            },
            Message::Close(None) => panic!("close frame should carry the policy code"),
            _ => {},
        }
    }
}

#[tokio::test]
async fn malformed_frame_drops_only_the_sender() {
    let addr = start_server(ServerConfig::default()).await;

    let (mut ws_a, _) =
        connect_async(format!("ws://{addr}/connect/delta?sessionId=a")).await.unwrap();
    let _ = next_binary(&mut ws_a).await;
    let (mut ws_b, _) =
        connect_async(format!("ws://{addr}/connect/delta?sessionId=b")).await.unwrap();
    let _ = next_binary(&mut ws_b).await;

    ws_a.send(Message::Binary(vec![0xde, 0xad, 0xbe, 0xef])).await.unwrap();

    // A gets closed with a protocol-error code.
    loop {
        match ws_a.next().await.expect("frame").expect("ok") {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1002);
                break;
            },
            _ => {},
        }
    }

    // B is unaffected and still receives broadcasts via a new client.
    let (mut ws_c, _) =
        connect_async(format!("ws://{addr}/connect/delta?sessionId=c")).await.unwrap();
    let _ = next_binary(&mut ws_c).await;
    let frame = shape_update_frame("rect-1", "green");
    ws_c.send(Message::Binary(frame.clone())).await.unwrap();
    assert_eq!(next_binary(&mut ws_b).await, frame);
}
