//! Filesystem-backed store: one flat directory per keyspace.
//!
//! Writes go to a temp file in the target directory and are renamed into
//! place, so a concurrent read observes either the previous or the new
//! blob, never a torn one. Listing swallows missing-file races: a file
//! deleted between the directory scan and the stat is simply skipped.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use super::{validate_id, SnapshotStore, StoreEntry, StoreError};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Flat-directory blob store for room snapshots and assets.
#[derive(Debug, Clone)]
pub struct FsStore {
    rooms_dir: PathBuf,
    assets_dir: PathBuf,
}

impl FsStore {
    /// Create a store rooted at the two given directories.
    ///
    /// The directories are created lazily on first write, so a read-only
    /// deployment that never uploads does not need them to exist.
    pub fn new(rooms_dir: impl Into<PathBuf>, assets_dir: impl Into<PathBuf>) -> Self {
        Self { rooms_dir: rooms_dir.into(), assets_dir: assets_dir.into() }
    }

    /// Directory holding room snapshots.
    pub fn rooms_dir(&self) -> &Path {
        &self.rooms_dir
    }

    /// Directory holding assets.
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    fn read(dir: &Path, id: &str) -> Result<Vec<u8>, StoreError> {
        validate_id(id)?;
        match fs::read(dir.join(id)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            },
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn write(dir: &Path, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_id(id)?;
        fs::create_dir_all(dir).map_err(|e| StoreError::Io(e.to_string()))?;

        // Temp file lives in the same directory so the rename stays on one
        // filesystem and is atomic.
        let nonce = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{id}.{nonce}.tmp"));
        fs::write(&tmp, bytes).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, dir.join(id)).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(e.to_string())
        })
    }

    fn delete(dir: &Path, id: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        match fs::remove_file(dir.join(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn list(dir: &Path) -> Result<Vec<StoreEntry>, StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let mut out = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(".tmp") {
                continue;
            }
            // The file may vanish between readdir and stat; skip it.
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            out.push(StoreEntry {
                id: name.to_string(),
                size: meta.len(),
                mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            });
        }
        Ok(out)
    }
}

impl SnapshotStore for FsStore {
    fn read_room(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.rooms_dir, id)
    }

    fn write_room(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.rooms_dir, id, bytes)
    }

    fn delete_room(&self, id: &str) -> Result<(), StoreError> {
        Self::delete(&self.rooms_dir, id)
    }

    fn list_rooms(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Self::list(&self.rooms_dir)
    }

    fn read_asset(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        Self::read(&self.assets_dir, id)
    }

    fn write_asset(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        Self::write(&self.assets_dir, id, bytes)
    }

    fn delete_asset(&self, id: &str) -> Result<(), StoreError> {
        Self::delete(&self.assets_dir, id)
    }

    fn list_assets(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Self::list(&self.assets_dir)
    }
}
