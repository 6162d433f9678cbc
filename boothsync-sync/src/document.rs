//! Entity documents as stored in the remote store.
//!
//! A document carries everything needed to rebuild an [`EntityRecord`] on
//! another device except the binary assets, which live under their own keys
//! and are listed here by SHA-256 so a download can verify them.

use crate::error::{Result, SyncError};
use boothsync_storage::{EntityRecord, EntityRef};
use boothsync_types::{ContentHash, DeviceId, EntityKind, LocalId, NaturalKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A by-name reference as written by the uploading device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub kind: EntityKind,
    pub name: String,
    /// The uploader's local id for the target. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_id: Option<LocalId>,
}

/// One asset listed by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub file: String,
    pub sha256: ContentHash,
}

/// Wire form of one entity (`<dir>/<name>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDocument {
    pub kind: EntityKind,
    pub name: String,
    pub data: Value,
    #[serde(default)]
    pub references: Vec<DocumentReference>,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
    pub version: u64,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: DeviceId,
    pub content_hash: ContentHash,
}

impl EntityDocument {
    /// Builds the document for a local record.
    pub fn from_record(record: &EntityRecord) -> Result<Self> {
        Ok(Self {
            kind: record.kind,
            name: record.name.clone(),
            data: record.data.clone(),
            references: record
                .references
                .iter()
                .map(|r| DocumentReference {
                    kind: r.kind,
                    name: r.name.clone(),
                    referenced_id: r.local_id,
                })
                .collect(),
            assets: record
                .asset_digests()
                .into_iter()
                .map(|(file, sha256)| AssetEntry { file, sha256 })
                .collect(),
            version: record.version,
            last_modified_at: record.modified_at,
            last_modified_by: record.modified_by.clone(),
            content_hash: record.content_hash()?,
        })
    }

    /// Natural key of the document's entity.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.kind, self.name.clone())
    }

    /// Encodes the document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a document fetched for `expected`. A document whose kind or
    /// name disagrees with the key it was stored under is rejected.
    pub fn from_bytes(expected: &NaturalKey, bytes: &[u8]) -> Result<Self> {
        let doc: Self = serde_json::from_slice(bytes)?;
        if doc.natural_key() != *expected {
            return Err(SyncError::InvalidDocument {
                key: expected.clone(),
                reason: format!("document describes {}", doc.natural_key()),
            });
        }
        Ok(doc)
    }

    /// The uploader's local id for each referenced natural key.
    pub fn remote_reference_ids(&self) -> BTreeMap<NaturalKey, LocalId> {
        self.references
            .iter()
            .filter_map(|r| {
                r.referenced_id
                    .map(|id| (NaturalKey::new(r.kind, r.name.clone()), id))
            })
            .collect()
    }

    /// Rebuilds a record from the document and its downloaded assets.
    ///
    /// Reference local ids start out unresolved; the identity pass fills them
    /// in. Asset digests and the content hash are verified.
    pub fn into_record(
        self,
        id: Option<LocalId>,
        assets: BTreeMap<String, Vec<u8>>,
    ) -> Result<EntityRecord> {
        let key = self.natural_key();
        for entry in &self.assets {
            let bytes = assets.get(&entry.file).ok_or_else(|| SyncError::InvalidDocument {
                key: key.clone(),
                reason: format!("asset {} not supplied", entry.file),
            })?;
            if ContentHash::of_bytes(bytes) != entry.sha256 {
                return Err(SyncError::InvalidDocument {
                    key: key.clone(),
                    reason: format!("asset {} does not match its digest", entry.file),
                });
            }
        }

        let record = EntityRecord {
            id,
            kind: self.kind,
            name: self.name,
            data: self.data,
            references: self
                .references
                .into_iter()
                .map(|r| EntityRef::new(r.kind, r.name, None))
                .collect(),
            assets,
            version: self.version,
            modified_at: self.last_modified_at,
            modified_by: self.last_modified_by,
        };

        let actual = record.content_hash()?;
        if actual != self.content_hash {
            return Err(SyncError::InvalidDocument {
                key,
                reason: format!("content hash {actual} != declared {}", self.content_hash),
            });
        }
        Ok(record)
    }
}
