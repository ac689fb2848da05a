//! Room engine: owns every live room, serializes access to each, and
//! drives the persistence and lifecycle timers.
//!
//! The registry is the engine's own concurrency domain (one `RwLock`
//! around the id→room map); each room serializes its own mutable state
//! (see [`room`]). `obtain_room` uses check-then-insert with a re-check
//! under the write lock, so concurrent callers for the same id observe
//! exactly one room.
//!
//! Three timers drive a room's life: a debounced flush armed by changes,
//! a per-room maintenance tick that backup-flushes and deregisters closed
//! rooms, and an idle-grace timer armed when the last session departs.

mod doc;
mod room;

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
pub use doc::{DocError, DocOutcome, DocState};
pub use room::{Room, RoomStats};
use tokio::sync::{mpsc::UnboundedSender, RwLock};

use crate::{
    config::ServerConfig,
    error::EngineError,
    store::{validate_id, SnapshotStore},
};

/// Owner of all live rooms.
pub struct RoomEngine<S: SnapshotStore> {
    store: S,
    config: Arc<ServerConfig>,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl<S: SnapshotStore> RoomEngine<S> {
    /// Create an engine over the given store.
    pub fn new(store: S, config: Arc<ServerConfig>) -> Self {
        Self { store, config, rooms: RwLock::new(HashMap::new()) }
    }

    /// The snapshot store this engine persists through.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return the live room for `id`, creating it from its snapshot (or
    /// empty) if none is registered.
    pub async fn obtain_room(self: &Arc<Self>, id: &str) -> Result<Arc<Room>, EngineError> {
        validate_id(id).map_err(EngineError::Store)?;

        if let Some(room) = self.rooms.read().await.get(id) {
            if !room.is_closed() {
                return Ok(Arc::clone(room));
            }
        }

        let mut rooms = self.rooms.write().await;
        // Re-check: another caller may have registered while we waited.
        if let Some(room) = rooms.get(id) {
            if !room.is_closed() {
                return Ok(Arc::clone(room));
            }
        }

        let doc = match self.store.read_room(id) {
            Ok(bytes) => match DocState::from_snapshot(&bytes) {
                Ok(doc) => {
                    tracing::debug!(room_id = id, bytes = bytes.len(), "room loaded from snapshot");
                    doc
                },
                Err(e) => {
                    tracing::warn!(room_id = id, error = %e, "snapshot unreadable, starting empty");
                    DocState::new()
                },
            },
            Err(e) if e.is_not_found() => DocState::new(),
            Err(e) => {
                tracing::warn!(room_id = id, error = %e, "snapshot read failed, starting empty");
                DocState::new()
            },
        };

        let room = Arc::new(Room::new(id, doc));
        rooms.insert(id.to_string(), Arc::clone(&room));
        tracing::info!(room_id = id, "room opened");

        tokio::spawn(maintenance_loop(Arc::clone(self), Arc::clone(&room)));

        Ok(room)
    }

    /// Install a session on a room, cancelling any pending idle-close.
    ///
    /// Fails with [`EngineError::RoomClosed`] if the room closed between
    /// `obtain_room` and this call.
    pub fn attach_session(
        &self,
        room: &Arc<Room>,
        session_id: &str,
        tx: UnboundedSender<Bytes>,
    ) -> Result<(), EngineError> {
        room.attach(session_id, tx)?;
        tracing::debug!(room_id = room.id(), session_id, "session attached");
        Ok(())
    }

    /// Apply one inbound frame and, if it changed the document, (re)arm
    /// the debounced flush.
    pub fn apply_message(
        self: &Arc<Self>,
        room: &Arc<Room>,
        session_id: &str,
        data: &[u8],
    ) -> Result<(), EngineError> {
        let changed = room.apply(session_id, data)?;
        if changed {
            let engine = Arc::clone(self);
            let target = Arc::clone(room);
            let debounce = self.config.flush_debounce;
            room.set_flush_timer(tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                engine.flush_room(&target);
            }));
        }
        Ok(())
    }

    /// Remove a session from its room; if it was the last one, arm the
    /// idle-grace timer.
    pub fn session_removed(self: &Arc<Self>, room: &Arc<Room>, session_id: &str) {
        let remaining = room.detach(session_id);
        tracing::debug!(room_id = room.id(), session_id, remaining, "session removed");
        if remaining > 0 || room.is_closed() {
            return;
        }

        let engine = Arc::clone(self);
        let target = Arc::clone(room);
        let grace = self.config.idle_grace;
        room.set_idle_timer(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if target.close_if_idle() {
                tracing::info!(room_id = target.id(), "room closed after idle grace");
                engine.flush_room(&target);
            }
        }));
    }

    /// Write the room's snapshot if it is dirty. Failures are logged and
    /// retried by the next change or maintenance tick.
    fn flush_room(&self, room: &Arc<Room>) {
        let Some((bytes, gen)) = room.begin_flush() else { return };
        match self.store.write_room(room.id(), &bytes) {
            Ok(()) => {
                room.finish_flush(gen);
                tracing::debug!(room_id = room.id(), bytes = bytes.len(), "snapshot written");
            },
            Err(e) => {
                tracing::warn!(room_id = room.id(), error = %e, "snapshot write failed");
            },
        }
    }

    /// Drop a closed room from the registry, unless a newer room has
    /// already taken its id.
    async fn deregister(&self, room: &Arc<Room>) {
        let mut rooms = self.rooms.write().await;
        if let Some(current) = rooms.get(room.id()) {
            if Arc::ptr_eq(current, room) {
                rooms.remove(room.id());
                tracing::info!(room_id = room.id(), "room deregistered");
            }
        }
    }

    /// Ids of all registered rooms.
    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Observability stats for one room, if registered.
    pub async fn room_stats(&self, id: &str) -> Option<RoomStats> {
        self.rooms.read().await.get(id).map(|room| room.stats())
    }

    /// Total attached sessions across all rooms.
    pub async fn total_sessions(&self) -> usize {
        self.rooms.read().await.values().map(|room| room.stats().active_sessions).sum()
    }

    /// Whether a live (non-closed) room with at least one session holds
    /// this id. The sweeper's veto check.
    pub async fn room_has_active_sessions(&self, id: &str) -> bool {
        self.rooms
            .read()
            .await
            .get(id)
            .is_some_and(|room| !room.is_closed() && room.has_sessions())
    }

    /// Evict a room that has no sessions (or is already closed) from the
    /// registry. Returns whether an entry was removed.
    pub async fn evict_idle(&self, id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(id) else { return false };
        if !room.is_closed() && room.has_sessions() {
            return false;
        }
        let room = Arc::clone(room);
        room.force_close();
        rooms.remove(id);
        tracing::info!(room_id = id, "stale room evicted");
        true
    }

    /// Close every room with a terminal flush attempt. Called on process
    /// shutdown after the listener has drained.
    pub async fn shutdown(&self) {
        let rooms: Vec<Arc<Room>> =
            self.rooms.write().await.drain().map(|(_, room)| room).collect();
        for room in rooms {
            room.force_close();
            self.flush_room(&room);
            tracing::info!(room_id = room.id(), "room closed for shutdown");
        }
    }
}

impl<S: SnapshotStore> std::fmt::Debug for RoomEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomEngine").finish_non_exhaustive()
    }
}

/// Per-room supervision: backup-flush dirty state every tick and pull the
/// room out of the registry once it closes.
async fn maintenance_loop<S: SnapshotStore>(engine: Arc<RoomEngine<S>>, room: Arc<Room>) {
    let mut tick = tokio::time::interval(engine.config.maint_tick);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick completes immediately.
    tick.tick().await;

    loop {
        tick.tick().await;
        if room.is_closed() {
            engine.flush_room(&room);
            engine.deregister(&room).await;
            return;
        }
        engine.flush_room(&room);
    }
}
