//! In-memory store implementation for tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use super::{validate_id, SnapshotStore, StoreEntry, StoreError};

/// In-memory store backed by two `HashMap`s.
///
/// Clones share the same underlying maps via `Arc`, matching the contract
/// of the trait. Uses `lock().expect()`, which panics if the mutex is
/// poisoned - acceptable for test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    rooms: HashMap<String, (Vec<u8>, SystemTime)>,
    assets: HashMap<String, (Vec<u8>, SystemTime)>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdate a room snapshot's mtime, for retention tests.
    pub fn set_room_mtime(&self, id: &str, mtime: SystemTime) {
        if let Some(entry) = self.inner.lock().expect("mutex poisoned").rooms.get_mut(id) {
            entry.1 = mtime;
        }
    }

    /// Backdate an asset's mtime, for retention tests.
    pub fn set_asset_mtime(&self, id: &str, mtime: SystemTime) {
        if let Some(entry) = self.inner.lock().expect("mutex poisoned").assets.get_mut(id) {
            entry.1 = mtime;
        }
    }
}

fn read(map: &HashMap<String, (Vec<u8>, SystemTime)>, id: &str) -> Result<Vec<u8>, StoreError> {
    validate_id(id)?;
    map.get(id).map(|(bytes, _)| bytes.clone()).ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn write(
    map: &mut HashMap<String, (Vec<u8>, SystemTime)>,
    id: &str,
    bytes: &[u8],
) -> Result<(), StoreError> {
    validate_id(id)?;
    map.insert(id.to_string(), (bytes.to_vec(), SystemTime::now()));
    Ok(())
}

fn delete(map: &mut HashMap<String, (Vec<u8>, SystemTime)>, id: &str) -> Result<(), StoreError> {
    validate_id(id)?;
    map.remove(id);
    Ok(())
}

fn list(map: &HashMap<String, (Vec<u8>, SystemTime)>) -> Vec<StoreEntry> {
    map.iter()
        .map(|(id, (bytes, mtime))| StoreEntry {
            id: id.clone(),
            size: bytes.len() as u64,
            mtime: *mtime,
        })
        .collect()
}

impl SnapshotStore for MemoryStore {
    fn read_room(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        read(&self.inner.lock().expect("mutex poisoned").rooms, id)
    }

    fn write_room(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        write(&mut self.inner.lock().expect("mutex poisoned").rooms, id, bytes)
    }

    fn delete_room(&self, id: &str) -> Result<(), StoreError> {
        delete(&mut self.inner.lock().expect("mutex poisoned").rooms, id)
    }

    fn list_rooms(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(list(&self.inner.lock().expect("mutex poisoned").rooms))
    }

    fn read_asset(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        read(&self.inner.lock().expect("mutex poisoned").assets, id)
    }

    fn write_asset(&self, id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        write(&mut self.inner.lock().expect("mutex poisoned").assets, id, bytes)
    }

    fn delete_asset(&self, id: &str) -> Result<(), StoreError> {
        delete(&mut self.inner.lock().expect("mutex poisoned").assets, id)
    }

    fn list_assets(&self) -> Result<Vec<StoreEntry>, StoreError> {
        Ok(list(&self.inner.lock().expect("mutex poisoned").assets))
    }
}
