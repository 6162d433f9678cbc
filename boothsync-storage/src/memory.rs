//! In-memory store.

use crate::error::StorageResult;
use crate::record::{EntityRecord, Tombstone};
use crate::store::LocalStateStore;
use boothsync_types::{EntityKind, LocalId, NaturalKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    entities: HashMap<EntityKind, BTreeMap<LocalId, EntityRecord>>,
    next_id: HashMap<EntityKind, i64>,
    tombstones: BTreeMap<NaturalKey, Tombstone>,
    manifest: Option<String>,
}

/// A [`LocalStateStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next id handed out for `kind` at least `next`.
    ///
    /// Lets tests reproduce a device whose id sequence has moved on.
    pub fn reserve_ids(&self, kind: EntityKind, next: i64) {
        let mut inner = self.lock();
        let slot = inner.next_id.entry(kind).or_insert(1);
        *slot = (*slot).max(next);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStateStore for MemoryStateStore {
    fn list(&self, kind: EntityKind) -> StorageResult<Vec<EntityRecord>> {
        Ok(self
            .lock()
            .entities
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get(&self, kind: EntityKind, id: LocalId) -> StorageResult<Option<EntityRecord>> {
        Ok(self
            .lock()
            .entities
            .get(&kind)
            .and_then(|m| m.get(&id))
            .cloned())
    }

    fn upsert(&self, mut record: EntityRecord) -> StorageResult<LocalId> {
        let mut inner = self.lock();
        let kind = record.kind;
        let id = match record.id {
            Some(id) => {
                let slot = inner.next_id.entry(kind).or_insert(1);
                *slot = (*slot).max(id.get() + 1);
                id
            }
            None => {
                let slot = inner.next_id.entry(kind).or_insert(1);
                let id = LocalId::new(*slot);
                *slot += 1;
                id
            }
        };
        record.id = Some(id);
        inner.tombstones.remove(&record.natural_key());
        inner.entities.entry(kind).or_default().insert(id, record);
        Ok(id)
    }

    fn delete(&self, kind: EntityKind, id: LocalId) -> StorageResult<bool> {
        Ok(self
            .lock()
            .entities
            .get_mut(&kind)
            .and_then(|m| m.remove(&id))
            .is_some())
    }

    fn tombstones(&self) -> StorageResult<Vec<Tombstone>> {
        Ok(self.lock().tombstones.values().cloned().collect())
    }

    fn put_tombstone(&self, tombstone: Tombstone) -> StorageResult<()> {
        self.lock()
            .tombstones
            .insert(tombstone.key.clone(), tombstone);
        Ok(())
    }

    fn remove_tombstone(&self, key: &NaturalKey) -> StorageResult<bool> {
        Ok(self.lock().tombstones.remove(key).is_some())
    }

    fn load_manifest(&self) -> StorageResult<Option<String>> {
        Ok(self.lock().manifest.clone())
    }

    fn store_manifest(&self, json: &str) -> StorageResult<()> {
        self.lock().manifest = Some(json.to_string());
        Ok(())
    }
}
