//! Entity records as held by a local store.

use crate::error::StorageResult;
use boothsync_types::{ContentHash, DeviceId, EntityKind, LocalId, NaturalKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A reference from one entity to another, by natural key.
///
/// `local_id` caches the target's id on this device. It is rewritten by the
/// sync engine after every run and never leaves the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<LocalId>,
}

impl EntityRef {
    /// Creates a reference.
    pub fn new(kind: EntityKind, name: impl Into<String>, local_id: Option<LocalId>) -> Self {
        Self {
            kind,
            name: name.into(),
            local_id,
        }
    }

    /// Natural key of the referenced entity.
    #[must_use]
    pub fn target(&self) -> NaturalKey {
        NaturalKey::new(self.kind, self.name.clone())
    }
}

/// One template, event or setting.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Store-assigned id; `None` until first upsert.
    pub id: Option<LocalId>,
    pub kind: EntityKind,
    pub name: String,
    /// Application-defined payload.
    pub data: Value,
    pub references: Vec<EntityRef>,
    /// Binary assets by file name (template backgrounds, overlays).
    pub assets: BTreeMap<String, Vec<u8>>,
    /// Bumped on every local edit; copied verbatim on download.
    pub version: u64,
    pub modified_at: DateTime<Utc>,
    pub modified_by: DeviceId,
}

impl EntityRecord {
    /// Creates a new, not yet stored record authored by `device`.
    pub fn new(kind: EntityKind, name: impl Into<String>, data: Value, device: &DeviceId) -> Self {
        Self {
            id: None,
            kind,
            name: name.into(),
            data,
            references: Vec::new(),
            assets: BTreeMap::new(),
            version: 1,
            modified_at: Utc::now(),
            modified_by: device.clone(),
        }
    }

    /// Adds a by-name reference.
    #[must_use]
    pub fn with_reference(mut self, kind: EntityKind, name: impl Into<String>, local_id: Option<LocalId>) -> Self {
        self.references.push(EntityRef::new(kind, name, local_id));
        self
    }

    /// Attaches a binary asset.
    #[must_use]
    pub fn with_asset(mut self, file: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.assets.insert(file.into(), bytes);
        self
    }

    /// Natural key of this record.
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.kind, self.name.clone())
    }

    /// Marks a local edit: bumps the version and stamps time and author.
    pub fn touch(&mut self, device: &DeviceId) {
        self.version += 1;
        self.modified_at = Utc::now();
        self.modified_by = device.clone();
    }

    /// SHA-256 of each asset, by file name.
    #[must_use]
    pub fn asset_digests(&self) -> BTreeMap<String, ContentHash> {
        self.assets
            .iter()
            .map(|(file, bytes)| (file.clone(), ContentHash::of_bytes(bytes)))
            .collect()
    }

    /// The fields that define whether two devices hold the same entity.
    ///
    /// Local ids (own and referenced), version and modification stamps are
    /// excluded.
    #[must_use]
    pub fn semantic_json(&self) -> Value {
        let references: Vec<Value> = self
            .references
            .iter()
            .map(|r| json!({ "kind": r.kind, "name": r.name }))
            .collect();
        let assets: BTreeMap<String, String> = self
            .asset_digests()
            .into_iter()
            .map(|(file, hash)| (file, hash.to_string()))
            .collect();
        json!({
            "kind": self.kind,
            "name": self.name,
            "data": self.data,
            "references": references,
            "assets": assets,
        })
    }

    /// Content hash over [`semantic_json`](Self::semantic_json).
    pub fn content_hash(&self) -> StorageResult<ContentHash> {
        Ok(ContentHash::of_json(&self.semantic_json())?)
    }
}

/// Record of an intentional local deletion, propagated to other devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: NaturalKey,
    /// Version of the deleted record plus one.
    pub version: u64,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: DeviceId,
}
