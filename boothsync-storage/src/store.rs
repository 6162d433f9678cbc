//! The local store contract consumed by the sync engine.

use crate::error::StorageResult;
use crate::record::{EntityRecord, Tombstone};
use boothsync_types::{DeviceId, EntityKind, LocalId, NaturalKey};
use chrono::Utc;
use tracing::debug;

/// Per-kind CRUD store for kiosk entities.
///
/// Ids are scoped per kind and never reused after deletion. `upsert` stores
/// exactly the record it is given (version and stamps included); callers
/// that represent a local edit call [`EntityRecord::touch`] first.
pub trait LocalStateStore: Send + Sync {
    /// Lists all records of a kind, ordered by id.
    fn list(&self, kind: EntityKind) -> StorageResult<Vec<EntityRecord>>;

    /// Gets one record.
    fn get(&self, kind: EntityKind, id: LocalId) -> StorageResult<Option<EntityRecord>>;

    /// Finds every record of `kind` named `name`. More than one result means
    /// the store holds duplicates for a natural key.
    fn find_by_name(&self, kind: EntityKind, name: &str) -> StorageResult<Vec<EntityRecord>> {
        Ok(self
            .list(kind)?
            .into_iter()
            .filter(|r| r.name == name)
            .collect())
    }

    /// Inserts (`id == None`) or replaces a record and returns its id.
    /// Clears any tombstone for the record's natural key.
    fn upsert(&self, record: EntityRecord) -> StorageResult<LocalId>;

    /// Removes a record without leaving a tombstone. Returns false if absent.
    fn delete(&self, kind: EntityKind, id: LocalId) -> StorageResult<bool>;

    /// All recorded tombstones, ordered by natural key.
    fn tombstones(&self) -> StorageResult<Vec<Tombstone>>;

    /// Records (or replaces) a tombstone.
    fn put_tombstone(&self, tombstone: Tombstone) -> StorageResult<()>;

    /// Removes a tombstone. Returns false if absent.
    fn remove_tombstone(&self, key: &NaturalKey) -> StorageResult<bool>;

    /// The last manifest this device published, as raw JSON.
    fn load_manifest(&self) -> StorageResult<Option<String>>;

    /// Replaces the saved manifest.
    fn store_manifest(&self, json: &str) -> StorageResult<()>;
}

/// Deletes a record and leaves a tombstone so the deletion propagates.
///
/// Returns `None` if the record did not exist.
pub fn retire(
    store: &dyn LocalStateStore,
    kind: EntityKind,
    id: LocalId,
    device: &DeviceId,
) -> StorageResult<Option<Tombstone>> {
    let Some(record) = store.get(kind, id)? else {
        return Ok(None);
    };
    store.delete(kind, id)?;
    let tombstone = Tombstone {
        key: record.natural_key(),
        version: record.version + 1,
        deleted_at: Utc::now(),
        deleted_by: device.clone(),
    };
    store.put_tombstone(tombstone.clone())?;
    debug!("Retired {} (id {})", tombstone.key, id);
    Ok(Some(tombstone))
}
