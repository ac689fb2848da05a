//! Live room state: document, sessions, dirty tracking, timer slots.
//!
//! A `Room` is a single-owner serial domain. Every mutable field sits
//! behind one mutex, critical sections never suspend, and snapshot writes
//! happen outside the lock against bytes captured under it. The
//! `change_gen` counter guards the dirty flag: a flush only clears it if
//! no further change landed while the write was in flight.
//!
//! Timer slots hold at most one task handle each; arming a slot aborts the
//! previous occupant.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Instant,
};

use bytes::Bytes;
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};

use super::doc::DocState;
use crate::error::EngineError;

/// Read-only view of a room for observability.
#[derive(Debug, Clone)]
pub struct RoomStats {
    /// Number of attached sessions.
    pub active_sessions: usize,
    /// Monotonic time of the last message or attach.
    pub last_activity: Instant,
    /// Whether state has diverged from the last successful snapshot write.
    pub dirty: bool,
}

/// The live document for one collaboration room.
pub struct Room {
    id: String,
    inner: Mutex<RoomInner>,
}

struct RoomInner {
    doc: DocState,
    /// Per-session outbound queues. Each session's writer task drains its
    /// queue in order, which preserves per-receiver broadcast order.
    sessions: HashMap<String, UnboundedSender<Bytes>>,
    dirty: bool,
    change_gen: u64,
    closed: bool,
    last_activity: Instant,
    flush_timer: Option<JoinHandle<()>>,
    idle_timer: Option<JoinHandle<()>>,
}

impl Room {
    pub(crate) fn new(id: impl Into<String>, doc: DocState) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(RoomInner {
                doc,
                sessions: HashMap::new(),
                dirty: false,
                change_gen: 0,
                closed: false,
                last_activity: Instant::now(),
                flush_timer: None,
                idle_timer: None,
            }),
        }
    }

    /// The room id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the room has transitioned to its terminal state.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether any session is currently attached.
    pub fn has_sessions(&self) -> bool {
        !self.lock().sessions.is_empty()
    }

    /// Observability snapshot.
    pub fn stats(&self) -> RoomStats {
        let inner = self.lock();
        RoomStats {
            active_sessions: inner.sessions.len(),
            last_activity: inner.last_activity,
            dirty: inner.dirty,
        }
    }

    /// Install a session and send it the opening sync handshake.
    ///
    /// Cancels a pending idle-close. Fails with [`EngineError::RoomClosed`]
    /// if the room closed between `obtain_room` and this call.
    pub(crate) fn attach(
        &self,
        session_id: &str,
        tx: UnboundedSender<Bytes>,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(EngineError::RoomClosed(self.id.clone()));
        }
        if let Some(timer) = inner.idle_timer.take() {
            timer.abort();
        }
        let handshake = inner.doc.handshake();
        let _ = tx.send(handshake.into());
        inner.sessions.insert(session_id.to_string(), tx);
        inner.last_activity = Instant::now();
        Ok(())
    }

    /// Remove a session; returns how many remain.
    pub(crate) fn detach(&self, session_id: &str) -> usize {
        let mut inner = self.lock();
        inner.sessions.remove(session_id);
        inner.sessions.len()
    }

    /// Apply one inbound frame from a session and route the results.
    ///
    /// Returns whether the document changed. A decode or integration
    /// failure is the caller's cue to drop that session; the room and its
    /// other sessions are untouched.
    pub(crate) fn apply(&self, session_id: &str, data: &[u8]) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(EngineError::RoomClosed(self.id.clone()));
        }

        let outcome =
            inner.doc.apply_message(data).map_err(|e| EngineError::Protocol(e.to_string()))?;

        if let Some(reply) = outcome.reply {
            if let Some(tx) = inner.sessions.get(session_id) {
                let _ = tx.send(reply.into());
            }
        }
        if let Some(broadcast) = outcome.broadcast {
            let broadcast = Bytes::from(broadcast);
            for (id, tx) in &inner.sessions {
                if id != session_id {
                    // A dead receiver is cleaned up when its socket task
                    // detaches; dropping the frame here is fine.
                    let _ = tx.send(broadcast.clone());
                }
            }
        }
        if outcome.changed {
            inner.dirty = true;
            inner.change_gen += 1;
        }
        inner.last_activity = Instant::now();
        Ok(outcome.changed)
    }

    /// Capture the bytes for a flush, if one is needed.
    ///
    /// Returns the snapshot and the generation it reflects; the caller
    /// writes outside the lock and reports back via [`Self::finish_flush`].
    pub(crate) fn begin_flush(&self) -> Option<(Vec<u8>, u64)> {
        let inner = self.lock();
        if !inner.dirty {
            return None;
        }
        Some((inner.doc.snapshot(), inner.change_gen))
    }

    /// Clear the dirty flag after a successful write, unless a newer
    /// change arrived during the write.
    pub(crate) fn finish_flush(&self, gen: u64) {
        let mut inner = self.lock();
        if inner.change_gen == gen {
            inner.dirty = false;
        }
    }

    /// Close the room if it still has no sessions.
    ///
    /// Returns whether this call performed the transition.
    pub(crate) fn close_if_idle(&self) -> bool {
        let mut inner = self.lock();
        if inner.closed || !inner.sessions.is_empty() {
            return false;
        }
        inner.close();
        true
    }

    /// Unconditionally close the room (eviction, shutdown).
    ///
    /// Returns whether this call performed the transition.
    pub(crate) fn force_close(&self) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.close();
        inner.sessions.clear();
        true
    }

    /// Install the debounced-flush timer, replacing any pending one.
    pub(crate) fn set_flush_timer(&self, handle: JoinHandle<()>) {
        let mut inner = self.lock();
        if let Some(old) = inner.flush_timer.replace(handle) {
            old.abort();
        }
    }

    /// Install the idle-close timer, replacing any pending one.
    pub(crate) fn set_idle_timer(&self, handle: JoinHandle<()>) {
        let mut inner = self.lock();
        if let Some(old) = inner.idle_timer.replace(handle) {
            old.abort();
        }
    }

    /// Locks never cross an await point, so poisoning only happens if a
    /// holder panicked; the room is unrecoverable at that point.
    fn lock(&self) -> std::sync::MutexGuard<'_, RoomInner> {
        self.inner.lock().expect("room mutex poisoned")
    }
}

impl RoomInner {
    fn close(&mut self) {
        self.closed = true;
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("sessions", &inner.sessions.len())
            .field("dirty", &inner.dirty)
            .field("closed", &inner.closed)
            .finish()
    }
}
