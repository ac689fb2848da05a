//! Durable key→blob storage for room snapshots and uploaded assets.
//!
//! Two independent keyspaces (rooms, assets), each a flat namespace of
//! opaque blobs keyed by a validated identifier. The trait is synchronous
//! (no async) to keep implementations simple; blobs are small and callers
//! invoke it from the engine's flush path or request handlers.
//!
//! Ids are used verbatim as file names, so every operation validates them
//! first: anything containing a path separator or a `..` component is
//! rejected before it reaches the filesystem.

mod error;
mod fs;
mod memory;

use std::time::SystemTime;

pub use error::StoreError;
pub use fs::FsStore;
pub use memory::MemoryStore;

/// One entry in a keyspace listing.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The room or asset id (file name).
    pub id: String,
    /// Blob size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mtime: SystemTime,
}

/// Storage abstraction over the room and asset keyspaces.
///
/// Must be `Clone + Send + Sync` so it can be shared between the engine,
/// the HTTP handlers, and the sweeper; implementations share internal state
/// via `Arc`, so clones access the same underlying storage.
pub trait SnapshotStore: Clone + Send + Sync + 'static {
    /// Read a room snapshot. `NotFound` if no snapshot exists.
    fn read_room(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Write a room snapshot, replacing any previous one.
    fn write_room(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete a room snapshot. Deleting a missing snapshot is Ok.
    fn delete_room(&self, id: &str) -> Result<(), StoreError>;

    /// List all room snapshots. Order is not guaranteed.
    fn list_rooms(&self) -> Result<Vec<StoreEntry>, StoreError>;

    /// Read an asset blob. `NotFound` if no asset exists.
    fn read_asset(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Write an asset blob, replacing any previous one.
    fn write_asset(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete an asset. Deleting a missing asset is Ok.
    fn delete_asset(&self, id: &str) -> Result<(), StoreError>;

    /// List all assets. Order is not guaranteed.
    fn list_assets(&self) -> Result<Vec<StoreEntry>, StoreError>;
}

/// Validate an id for use as a flat file name.
///
/// Rejects empty ids, NUL bytes, path separators, and anything containing
/// `..`. The id is otherwise used verbatim, so this is the only traversal
/// barrier.
pub fn validate_id(id: &str) -> Result<(), StoreError> {
    let bad = id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
        || id.contains("..")
        || id == ".";

    if bad {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
