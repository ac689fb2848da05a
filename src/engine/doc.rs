//! Opaque document state backed by the yrs collaboration library.
//!
//! The engine never interprets document content; it speaks the Yjs sync
//! protocol just far enough to route messages. Sync handshakes produce a
//! direct reply to the sender, updates are applied and rebroadcast, and
//! awareness traffic is relayed without touching the document.

use thiserror::Error;
use yrs::{
    sync::{Message, SyncMessage},
    updates::{decoder::Decode, encoder::Encode},
    Doc, ReadTxn, StateVector, Transact, Update,
};

/// Errors from decoding or applying a sync message.
///
/// These are per-session faults: the offending session is dropped and the
/// room keeps running.
#[derive(Error, Debug)]
pub enum DocError {
    /// The frame is not a valid sync-protocol message.
    #[error("malformed sync message: {0}")]
    Decode(String),

    /// The update could not be integrated into the document.
    #[error("update rejected: {0}")]
    Apply(String),
}

/// What a processed message asks the room to do.
#[derive(Debug, Default)]
pub struct DocOutcome {
    /// Frame to send back to the originating session only.
    pub reply: Option<Vec<u8>>,
    /// Frame to fan out to every other session in the room.
    pub broadcast: Option<Vec<u8>>,
    /// Whether the document state diverged from the last snapshot.
    pub changed: bool,
}

/// Live document state for one room.
pub struct DocState {
    doc: Doc,
}

impl DocState {
    /// Create an empty document.
    pub fn new() -> Self {
        Self { doc: Doc::new() }
    }

    /// Rebuild a document from a persisted snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, DocError> {
        let state = Self::new();
        if !bytes.is_empty() {
            let update = Update::decode_v1(bytes).map_err(|e| DocError::Decode(e.to_string()))?;
            state
                .doc
                .transact_mut()
                .apply_update(update)
                .map_err(|e| DocError::Apply(e.to_string()))?;
        }
        Ok(state)
    }

    /// Encode the full document as a single update, suitable for
    /// [`Self::from_snapshot`].
    pub fn snapshot(&self) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(&StateVector::default())
    }

    /// Opening handshake sent to a freshly attached session.
    ///
    /// `SyncStep1` with our state vector; the client answers with the
    /// changes we are missing and requests ours the same way.
    pub fn handshake(&self) -> Vec<u8> {
        let sv = self.doc.transact().state_vector();
        Message::Sync(SyncMessage::SyncStep1(sv)).encode_v1()
    }

    /// Process one inbound frame from a session.
    pub fn apply_message(&mut self, data: &[u8]) -> Result<DocOutcome, DocError> {
        let message = Message::decode_v1(data).map_err(|e| DocError::Decode(e.to_string()))?;

        match message {
            Message::Sync(SyncMessage::SyncStep1(sv)) => {
                let diff = self.doc.transact().encode_state_as_update_v1(&sv);
                let reply = Message::Sync(SyncMessage::SyncStep2(diff)).encode_v1();
                Ok(DocOutcome { reply: Some(reply), broadcast: None, changed: false })
            },
            Message::Sync(SyncMessage::SyncStep2(update))
            | Message::Sync(SyncMessage::Update(update)) => {
                let decoded =
                    Update::decode_v1(&update).map_err(|e| DocError::Decode(e.to_string()))?;
                self.doc
                    .transact_mut()
                    .apply_update(decoded)
                    .map_err(|e| DocError::Apply(e.to_string()))?;
                Ok(DocOutcome { reply: None, broadcast: Some(data.to_vec()), changed: true })
            },
            // Presence traffic is relayed between peers, never persisted.
            Message::Awareness(_) | Message::AwarenessQuery => {
                Ok(DocOutcome { reply: None, broadcast: Some(data.to_vec()), changed: false })
            },
            _ => Ok(DocOutcome::default()),
        }
    }
}

impl Default for DocState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use yrs::{GetString, Map, Text};

    use super::*;

    /// Full state of `doc` wrapped as a sync Update message.
    fn update_message(doc: &Doc) -> Vec<u8> {
        let update = doc.transact().encode_state_as_update_v1(&StateVector::default());
        Message::Sync(SyncMessage::Update(update)).encode_v1()
    }

    fn client_doc_with_shape(key: &str, value: &str) -> Doc {
        let doc = Doc::new();
        let shapes = doc.get_or_insert_map("shapes");
        let mut txn = doc.transact_mut();
        shapes.insert(&mut txn, key, value);
        drop(txn);
        doc
    }

    #[test]
    fn update_is_applied_and_rebroadcast() {
        let mut state = DocState::new();
        let client = client_doc_with_shape("rect-1", "blue");
        let frame = update_message(&client);

        let outcome = state.apply_message(&frame).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.broadcast.as_deref(), Some(frame.as_slice()));
        assert!(outcome.reply.is_none());
    }

    #[test]
    fn sync_step1_gets_a_diff_reply_without_dirtying() {
        let mut state = DocState::new();
        let client = client_doc_with_shape("rect-1", "blue");
        state.apply_message(&update_message(&client)).unwrap();

        let step1 = Message::Sync(SyncMessage::SyncStep1(StateVector::default())).encode_v1();
        let outcome = state.apply_message(&step1).unwrap();

        assert!(!outcome.changed);
        assert!(outcome.broadcast.is_none());

        // The reply carries everything a blank peer is missing.
        let reply = outcome.reply.expect("handshake reply");
        let peer = Doc::new();
        let _shapes = peer.get_or_insert_map("shapes");
        match Message::decode_v1(&reply).unwrap() {
            Message::Sync(SyncMessage::SyncStep2(update)) => {
                peer.transact_mut().apply_update(Update::decode_v1(&update).unwrap()).unwrap();
            },
            other => panic!("expected SyncStep2, got {other:?}"),
        }
        let txn = peer.transact();
        assert_eq!(txn.state_vector(), state.doc.transact().state_vector());
    }

    #[test]
    fn snapshot_round_trip_is_a_fixed_point() {
        let mut state = DocState::new();
        let client = client_doc_with_shape("rect-1", "blue");
        state.apply_message(&update_message(&client)).unwrap();

        let snapshot = state.snapshot();
        let reloaded = DocState::from_snapshot(&snapshot).unwrap();

        assert_eq!(reloaded.snapshot(), snapshot);
    }

    #[test]
    fn empty_snapshot_loads_an_empty_doc() {
        let state = DocState::from_snapshot(&[]).unwrap();
        assert_eq!(
            state.doc.transact().state_vector(),
            DocState::new().doc.transact().state_vector()
        );
    }

    #[test]
    fn garbage_frames_are_rejected() {
        let mut state = DocState::new();
        assert!(state.apply_message(&[0xff, 0x00, 0x13, 0x37]).is_err());
    }

    #[test]
    fn interleaved_updates_from_two_clients_converge() {
        let mut state = DocState::new();

        let a = Doc::new();
        let text_a = a.get_or_insert_text("notes");
        {
            let mut txn = a.transact_mut();
            text_a.insert(&mut txn, 0, "x");
        }
        let b = Doc::new();
        let text_b = b.get_or_insert_text("notes");
        {
            let mut txn = b.transact_mut();
            text_b.insert(&mut txn, 0, "z");
        }
        state.apply_message(&update_message(&a)).unwrap();
        state.apply_message(&update_message(&b)).unwrap();
        {
            let mut txn = a.transact_mut();
            text_a.insert(&mut txn, 1, "y");
        }
        state.apply_message(&update_message(&a)).unwrap();

        // A third participant loading the snapshot sees all three edits.
        let fresh = DocState::from_snapshot(&state.snapshot()).unwrap();
        let text = fresh.doc.get_or_insert_text("notes");
        let contents = text.get_string(&fresh.doc.transact());
        assert_eq!(contents.len(), 3);
        for ch in ["x", "y", "z"] {
            assert!(contents.contains(ch), "{contents:?} missing {ch}");
        }
    }
}
