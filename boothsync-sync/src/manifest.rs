//! The manifest: a versioned index of every synced entity's metadata.
//!
//! [`ManifestManager`] builds the local manifest from the entity store,
//! fetches and publishes the shared one, and computes the operation list
//! that turns one into the other (see [`crate::diff`]).

use crate::config::SyncKinds;
use crate::diff::{diff, SyncOperation};
use crate::error::{Result, SyncError};
use crate::keys::{self, MANIFEST_KEY};
use boothsync_cloud::RemoteObjectStore;
use boothsync_storage::{EntityRecord, LocalStateStore, Tombstone};
use boothsync_types::{ContentHash, DeviceId, EntityKind, LocalId, NaturalKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sync-relevant metadata of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub natural_key: NaturalKey,
    pub kind: EntityKind,
    pub content_hash: ContentHash,
    pub version: u64,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: DeviceId,
    /// Marks a propagated deletion.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl ManifestItem {
    /// Item describing a live record.
    pub fn from_record(record: &EntityRecord) -> Result<Self> {
        Ok(Self {
            natural_key: record.natural_key(),
            kind: record.kind,
            content_hash: record.content_hash()?,
            version: record.version,
            last_modified_at: record.modified_at,
            last_modified_by: record.modified_by.clone(),
            deleted: false,
        })
    }

    /// Item describing a deletion.
    pub fn from_tombstone(tombstone: &Tombstone) -> Self {
        Self {
            natural_key: tombstone.key.clone(),
            kind: tombstone.key.kind,
            content_hash: ContentHash::empty(),
            version: tombstone.version,
            last_modified_at: tombstone.deleted_at,
            last_modified_by: tombstone.deleted_by.clone(),
            deleted: true,
        }
    }

    /// The tombstone a device records when it applies this deleted item.
    pub fn to_tombstone(&self) -> Tombstone {
        Tombstone {
            key: self.natural_key.clone(),
            version: self.version,
            deleted_at: self.last_modified_at,
            deleted_by: self.last_modified_by.clone(),
        }
    }

    /// Orders two edits of the same entity: later timestamp, then higher
    /// version, then greater device id.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.last_modified_at
            .cmp(&other.last_modified_at)
            .then(self.version.cmp(&other.version))
            .then_with(|| self.last_modified_by.cmp(&other.last_modified_by))
    }

    /// Returns true if both items describe the same state.
    pub fn same_content(&self, other: &Self) -> bool {
        match (self.deleted, other.deleted) {
            (true, true) => true,
            (false, false) => self.content_hash == other.content_hash,
            _ => false,
        }
    }
}

/// A versioned set of manifest items, unique by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireManifest", try_from = "WireManifest")]
pub struct Manifest {
    pub global_version: u64,
    pub modified_by: DeviceId,
    items: BTreeMap<NaturalKey, ManifestItem>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireManifest {
    global_version: u64,
    modified_by: DeviceId,
    #[serde(default)]
    items: Vec<ManifestItem>,
}

impl From<Manifest> for WireManifest {
    fn from(manifest: Manifest) -> Self {
        Self {
            global_version: manifest.global_version,
            modified_by: manifest.modified_by,
            items: manifest.items.into_values().collect(),
        }
    }
}

impl TryFrom<WireManifest> for Manifest {
    type Error = String;

    fn try_from(wire: WireManifest) -> std::result::Result<Self, Self::Error> {
        let mut items = BTreeMap::new();
        for item in wire.items {
            if item.kind != item.natural_key.kind {
                return Err(format!(
                    "item {} declares kind {}",
                    item.natural_key, item.kind
                ));
            }
            let key = item.natural_key.clone();
            if items.insert(key.clone(), item).is_some() {
                return Err(format!("duplicate natural key {key}"));
            }
        }
        Ok(Self {
            global_version: wire.global_version,
            modified_by: wire.modified_by,
            items,
        })
    }
}

impl Manifest {
    /// An empty manifest at version 0.
    pub fn empty(modified_by: DeviceId) -> Self {
        Self {
            global_version: 0,
            modified_by,
            items: BTreeMap::new(),
        }
    }

    /// Builds a manifest from items. Later items replace earlier ones with
    /// the same natural key.
    pub fn from_items(
        global_version: u64,
        modified_by: DeviceId,
        items: impl IntoIterator<Item = ManifestItem>,
    ) -> Self {
        Self {
            global_version,
            modified_by,
            items: items
                .into_iter()
                .map(|item| (item.natural_key.clone(), item))
                .collect(),
        }
    }

    pub fn get(&self, key: &NaturalKey) -> Option<&ManifestItem> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &NaturalKey) -> bool {
        self.items.contains_key(key)
    }

    /// Inserts or replaces an item.
    pub fn insert(&mut self, item: ManifestItem) -> Option<ManifestItem> {
        self.items.insert(item.natural_key.clone(), item)
    }

    pub fn remove(&mut self, key: &NaturalKey) -> Option<ManifestItem> {
        self.items.remove(key)
    }

    /// Items in sync order.
    pub fn items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if both manifests hold exactly the same items,
    /// regardless of version and author.
    pub fn same_items(&self, other: &Manifest) -> bool {
        self.items == other.items
    }

    /// Splits off the items whose kind is not synced.
    pub fn split_disabled(mut self, kinds: &SyncKinds) -> (Manifest, Vec<ManifestItem>) {
        let (enabled, disabled): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|(key, _)| kinds.is_enabled(key.kind));
        self.items = enabled;
        (self, disabled.into_values().collect())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Outcome of fetching the shared manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteManifest {
    Found(Manifest),
    /// No manifest yet: first sync.
    NotFound,
    /// The manifest exists but could not be parsed.
    Corrupt(String),
}

/// Everything the engine reads from the local store at the start of a run.
#[derive(Debug, Clone)]
pub struct LocalSnapshot {
    pub manifest: Manifest,
    /// Live records by natural key (duplicates excluded).
    pub records: HashMap<NaturalKey, EntityRecord>,
    /// Natural keys held by more than one local record.
    pub duplicates: BTreeMap<NaturalKey, Vec<LocalId>>,
    /// Entities left out because the remote layout cannot hold them.
    pub unstorable: BTreeMap<NaturalKey, String>,
}

/// Builds, fetches, diffs and publishes manifests.
#[derive(Clone)]
pub struct ManifestManager {
    local: Arc<dyn LocalStateStore>,
    remote: Arc<dyn RemoteObjectStore>,
    device: DeviceId,
    kinds: SyncKinds,
}

impl ManifestManager {
    pub fn new(
        local: Arc<dyn LocalStateStore>,
        remote: Arc<dyn RemoteObjectStore>,
        device: DeviceId,
        kinds: SyncKinds,
    ) -> Self {
        Self {
            local,
            remote,
            device,
            kinds,
        }
    }

    /// Reads every enabled kind from the local store.
    ///
    /// Deterministic: with no store mutation in between, two calls produce
    /// identical manifests. Records sharing a natural key are left out of
    /// the manifest and listed in [`LocalSnapshot::duplicates`]; records the
    /// remote layout cannot hold go to [`LocalSnapshot::unstorable`].
    pub fn snapshot_local(&self) -> Result<LocalSnapshot> {
        let mut by_key: BTreeMap<NaturalKey, Vec<EntityRecord>> = BTreeMap::new();
        for kind in self.kinds.enabled() {
            for record in self.local.list(kind)? {
                by_key.entry(record.natural_key()).or_default().push(record);
            }
        }

        let mut items = Vec::new();
        let mut records = HashMap::new();
        let mut duplicates = BTreeMap::new();
        let mut unstorable = BTreeMap::new();
        for (key, mut group) in by_key {
            if group.len() > 1 {
                let ids: Vec<LocalId> = group.iter().filter_map(|r| r.id).collect();
                warn!("Duplicate natural key {} (local ids {:?})", key, ids);
                duplicates.insert(key, ids);
                continue;
            }
            let Some(record) = group.pop() else {
                continue;
            };
            if let Err(reason) = keys::check_storable(&record) {
                warn!("Leaving {:?} out of the manifest: {}", key.to_string(), reason);
                unstorable.insert(key, reason);
                continue;
            }
            items.push(ManifestItem::from_record(&record)?);
            records.insert(key, record);
        }

        for tombstone in self.local.tombstones()? {
            let key = &tombstone.key;
            if !self.kinds.is_enabled(key.kind)
                || records.contains_key(key)
                || duplicates.contains_key(key)
                || unstorable.contains_key(key)
            {
                continue;
            }
            if let Err(reason) = keys::check_name(key) {
                debug!("Skipping tombstone {:?}: {}", key.to_string(), reason);
                continue;
            }
            items.push(ManifestItem::from_tombstone(&tombstone));
        }

        let global_version = self
            .last_published()?
            .map(|m| m.global_version)
            .unwrap_or_default();
        let manifest = Manifest::from_items(global_version, self.device.clone(), items);
        debug!(
            "Local manifest: {} items, {} duplicate keys",
            manifest.len(),
            duplicates.len()
        );
        Ok(LocalSnapshot {
            manifest,
            records,
            duplicates,
            unstorable,
        })
    }

    /// Builds the local manifest.
    pub fn build_local_manifest(&self) -> Result<Manifest> {
        Ok(self.snapshot_local()?.manifest)
    }

    /// The manifest this device last published, if any. An unreadable saved
    /// copy is ignored.
    pub fn last_published(&self) -> Result<Option<Manifest>> {
        let Some(json) = self.local.load_manifest()? else {
            return Ok(None);
        };
        match Manifest::from_json(json.as_bytes()) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!("Ignoring unreadable saved manifest: {}", e);
                Ok(None)
            }
        }
    }

    /// GETs the shared manifest.
    pub async fn fetch_remote_manifest(&self) -> Result<RemoteManifest> {
        let Some(bytes) = self.remote.get(MANIFEST_KEY).await? else {
            info!("No remote manifest yet");
            return Ok(RemoteManifest::NotFound);
        };
        match Manifest::from_json(&bytes) {
            Ok(manifest) => {
                debug!(
                    "Remote manifest v{} by {} ({} items)",
                    manifest.global_version,
                    manifest.modified_by,
                    manifest.len()
                );
                Ok(RemoteManifest::Found(manifest))
            }
            Err(e) => {
                warn!("Remote manifest is corrupt: {}", e);
                Ok(RemoteManifest::Corrupt(e.to_string()))
            }
        }
    }

    /// Computes the operations that reconcile `local` with `remote`.
    pub fn diff(&self, local: &Manifest, remote: &Manifest) -> Vec<SyncOperation> {
        diff(local, remote)
    }

    /// Writes the manifest to the remote store, then saves it locally.
    pub async fn publish(&self, manifest: &Manifest) -> Result<()> {
        let json = manifest.to_json()?;
        self.remote.put(MANIFEST_KEY, json.as_bytes()).await?;
        self.save_local(json).await?;
        info!(
            "Published manifest v{} ({} items)",
            manifest.global_version,
            manifest.len()
        );
        Ok(())
    }

    /// Saves a manifest as this device's last published copy without
    /// touching the remote store.
    pub async fn save_local(&self, json: String) -> Result<()> {
        let local = Arc::clone(&self.local);
        tokio::task::spawn_blocking(move || local.store_manifest(&json))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;
        Ok(())
    }
}
