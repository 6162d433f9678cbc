//! Sync orchestrator: runs one reconciliation pass end to end.
//!
//! ```text
//! Idle -> Checking -> Diffing -> Transferring -> Reconciling -> Idle
//!            \           \            \               \
//!             +-----------+------------+---------------+--> Error -> Idle
//! ```
//!
//! Each operation is applied on its own; a failing item is recorded and the
//! run moves on. Authentication failures end the transfer step early, and
//! the manifest is then left unpublished so the next run starts from the
//! same remote state.

use crate::config::SyncKinds;
use crate::diff::{diff, SyncAction, SyncOperation};
use crate::document::EntityDocument;
use crate::error::{ErrorKind, Result, SyncError};
use crate::identity::IdentityResolver;
use crate::keys;
use crate::manifest::{LocalSnapshot, Manifest, ManifestItem, ManifestManager, RemoteManifest};
use crate::notify::{NotificationBus, SyncNotification};
use crate::result::{ItemStatus, SyncResult};
use crate::retry::RetryPolicy;
use boothsync_cloud::{CloudResult, RemoteObjectStore};
use boothsync_storage::{EntityRecord, LocalStateStore};
use boothsync_types::{DeviceId, LocalId, NaturalKey};
use chrono::Utc;
use futures::TryFutureExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Checking,
    Diffing,
    Transferring,
    Reconciling,
    Error,
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub device_id: DeviceId,
    pub kinds: SyncKinds,
    pub retry: RetryPolicy,
    /// Upper bound on a whole run.
    pub run_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            kinds: SyncKinds::all(),
            retry: RetryPolicy::default(),
            run_timeout: Duration::from_secs(600),
        }
    }
}

/// Executes sync runs against one local and one remote store.
pub struct SyncOrchestrator {
    local: Arc<dyn LocalStateStore>,
    remote: Arc<dyn RemoteObjectStore>,
    bus: Arc<NotificationBus>,
    manifests: ManifestManager,
    config: OrchestratorConfig,
    phase: watch::Sender<SyncPhase>,
}

impl SyncOrchestrator {
    pub fn new(
        local: Arc<dyn LocalStateStore>,
        remote: Arc<dyn RemoteObjectStore>,
        bus: Arc<NotificationBus>,
        config: OrchestratorConfig,
    ) -> Self {
        let manifests = ManifestManager::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            config.device_id.clone(),
            config.kinds,
        );
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            local,
            remote,
            bus,
            manifests,
            config,
            phase,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.config.device_id
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn manifests(&self) -> &ManifestManager {
        &self.manifests
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: SyncPhase) {
        debug!("Sync phase: {:?}", phase);
        self.phase.send_replace(phase);
        self.bus.publish(SyncNotification::PhaseChanged { phase });
    }

    /// Single connectivity and credentials check, without retries.
    pub async fn probe(&self) -> Result<()> {
        Ok(self.remote.probe().await?)
    }

    /// Runs one full sync pass and reports what happened.
    ///
    /// Never fails: every problem ends up in the returned [`SyncResult`].
    /// With stable state on both sides a second run is all-Skip and leaves
    /// the global manifest version unchanged.
    pub async fn run_once(&self) -> SyncResult {
        info!("Sync run started on {}", self.config.device_id);
        self.bus.publish(SyncNotification::SyncStarted);
        let mut result = SyncResult::new(Utc::now());

        match tokio::time::timeout(self.config.run_timeout, self.run_phases(&mut result)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("Sync run failed: {}", err);
                result.push_error(None, err.kind(), err.to_string());
            }
            Err(_) => {
                let err = SyncError::Timeout(self.config.run_timeout);
                warn!("{}", err);
                result.push_error(None, ErrorKind::Timeout, err.to_string());
            }
        }

        result.finish(Utc::now());
        if !result.success {
            self.set_phase(SyncPhase::Error);
        }
        self.set_phase(SyncPhase::Idle);
        info!("Sync run finished: {}", result.summary());
        self.bus.publish(SyncNotification::SyncCompleted {
            result: result.clone(),
        });
        result
    }

    async fn run_phases(&self, result: &mut SyncResult) -> Result<()> {
        // ── Checking ─────────────────────────────────────────────
        self.set_phase(SyncPhase::Checking);
        let remote = self.remote.as_ref();
        self.remote_call("probe", move || remote.probe()).await?;

        // ── Diffing ──────────────────────────────────────────────
        self.set_phase(SyncPhase::Diffing);
        let manifests = self.manifests.clone();
        let snapshot = self.blocking(move |_| manifests.snapshot_local()).await?;

        let manifests = &self.manifests;
        let fetched = self
            .config
            .retry
            .run("fetch manifest", move || manifests.fetch_remote_manifest())
            .await?;
        let (remote_manifest, remote_found) = match fetched {
            RemoteManifest::Found(manifest) => (manifest, true),
            RemoteManifest::NotFound => (Manifest::empty(self.config.device_id.clone()), false),
            RemoteManifest::Corrupt(reason) => {
                result.push_error(
                    None,
                    ErrorKind::ManifestCorruption,
                    format!("remote manifest unreadable, treated as empty: {reason}"),
                );
                (Manifest::empty(self.config.device_id.clone()), false)
            }
        };

        for (key, ids) in &snapshot.duplicates {
            result.push_error(
                Some(key.clone()),
                ErrorKind::IdentityConflict,
                format!("{} local entities share this natural key (ids {:?})", ids.len(), ids),
            );
        }
        for (key, reason) in &snapshot.unstorable {
            result.push_error(
                Some(key.clone()),
                ErrorKind::Serialization,
                format!("not synced: {reason}"),
            );
        }

        let (remote_enabled, disabled) = remote_manifest.clone().split_disabled(&self.config.kinds);
        let ops = diff(&snapshot.manifest, &remote_enabled);
        info!(
            "Diff: {} operations ({} to apply)",
            ops.len(),
            ops.iter().filter(|op| op.action != SyncAction::Skip).count()
        );

        // ── Transferring ─────────────────────────────────────────
        self.set_phase(SyncPhase::Transferring);
        let mut merged: Vec<ManifestItem> = disabled;
        let total = ops.len();
        for (index, op) in ops.iter().enumerate() {
            self.bus.publish(SyncNotification::SyncProgress {
                message: format!("{} {}", op.action, op.key),
                percent: percent(index, total),
            });

            if snapshot.duplicates.contains_key(&op.key) {
                result.record(&op.key, op.action, ItemStatus::Failed(ErrorKind::IdentityConflict));
                merged.extend(op.remote.clone());
                continue;
            }
            if snapshot.unstorable.contains_key(&op.key) {
                result.record(&op.key, op.action, ItemStatus::Failed(ErrorKind::Serialization));
                merged.extend(op.remote.clone());
                continue;
            }

            match self.apply(op, &snapshot).await {
                Ok(item) => {
                    result.record(&op.key, op.action, ItemStatus::applied(op.action));
                    merged.extend(item);
                }
                Err(err) if err.is_auth() => {
                    warn!("Authentication failed at {}, aborting transfers: {}", op.key, err);
                    result.record_failure(&op.key, op.action, &err);
                    self.bus.publish(SyncNotification::SyncProgress {
                        message: format!("authentication failed: {err}"),
                        percent: percent(index, total),
                    });
                    return Ok(());
                }
                Err(err) => {
                    warn!("{} {} failed: {}", op.action, op.key, err);
                    result.record_failure(&op.key, op.action, &err);
                    merged.extend(op.remote.clone());
                }
            }
        }

        // ── Reconciling ──────────────────────────────────────────
        self.set_phase(SyncPhase::Reconciling);
        self.bus.publish(SyncNotification::SyncProgress {
            message: "reconciling".to_string(),
            percent: 100,
        });

        let kinds = self.config.kinds;
        let report = self
            .blocking(move |store| IdentityResolver::new(store).reconcile_all(&kinds))
            .await?;
        debug!(
            "Identity pass: {} records rewritten, {} mappings",
            report.rewritten.len(),
            report.mappings.len()
        );
        let mut reported: HashSet<NaturalKey> = result
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::IdentityConflict)
            .filter_map(|e| e.key.clone())
            .collect();
        for conflict in report.conflicts {
            if reported.insert(conflict.referrer.clone()) {
                result.push_error(
                    Some(conflict.referrer),
                    ErrorKind::IdentityConflict,
                    format!(
                        "reference to {} is ambiguous (local ids {:?})",
                        conflict.target, conflict.candidates
                    ),
                );
            }
        }

        let mut next = Manifest::from_items(
            remote_manifest.global_version,
            remote_manifest.modified_by.clone(),
            merged,
        );
        if remote_found && next.same_items(&remote_manifest) {
            debug!("Item set unchanged, keeping manifest v{}", remote_manifest.global_version);
            self.manifests.save_local(remote_manifest.to_json()?).await?;
            result.global_version = Some(remote_manifest.global_version);
            return Ok(());
        }

        next.global_version = remote_manifest
            .global_version
            .max(snapshot.manifest.global_version)
            + 1;
        next.modified_by = self.config.device_id.clone();
        let next_ref = &next;
        self.config
            .retry
            .run("publish manifest", move || manifests.publish(next_ref))
            .await?;
        result.global_version = Some(next.global_version);
        Ok(())
    }

    /// Applies one operation and returns the item the merged manifest
    /// should hold for its key.
    async fn apply(&self, op: &SyncOperation, snapshot: &LocalSnapshot) -> Result<Option<ManifestItem>> {
        match op.action {
            SyncAction::Skip => Ok(op.remote.clone().or_else(|| op.local.clone())),
            SyncAction::UploadNew | SyncAction::UploadUpdate => {
                let record = snapshot
                    .records
                    .get(&op.key)
                    .ok_or_else(|| missing_side(&op.key, "local record"))?;
                self.upload(record).await.map(Some)
            }
            SyncAction::DownloadNew | SyncAction::DownloadUpdate => {
                let existing = snapshot.records.get(&op.key).and_then(|r| r.id);
                self.download(&op.key, existing).await.map(Some)
            }
            SyncAction::DeleteLocal => {
                let item = op
                    .remote
                    .clone()
                    .ok_or_else(|| missing_side(&op.key, "remote item"))?;
                let id = snapshot.records.get(&op.key).and_then(|r| r.id);
                self.delete_local(&op.key, id, &item).await?;
                Ok(Some(item))
            }
            SyncAction::DeleteRemote => {
                let item = op
                    .local
                    .clone()
                    .ok_or_else(|| missing_side(&op.key, "local item"))?;
                self.delete_remote(&op.key).await?;
                Ok(Some(item))
            }
        }
    }

    /// Uploads assets, drops stale ones, then writes the document.
    async fn upload(&self, record: &EntityRecord) -> Result<ManifestItem> {
        let key = record.natural_key();
        let item = ManifestItem::from_record(record)?;
        let document = EntityDocument::from_record(record)?.to_bytes()?;
        let remote = self.remote.as_ref();

        let mut wanted = BTreeSet::new();
        for (file, bytes) in &record.assets {
            let object = keys::asset_key(&key, file);
            let (object_ref, bytes) = (object.as_str(), bytes.as_slice());
            self.remote_call("upload asset", move || remote.put(object_ref, bytes))
                .await?;
            wanted.insert(object);
        }

        let prefix = keys::asset_prefix(&key);
        let prefix_ref = prefix.as_str();
        let existing = self
            .remote_call("list assets", move || remote.list(prefix_ref))
            .await?;
        for stale in existing.iter().filter(|k| !wanted.contains(*k)) {
            let stale = stale.as_str();
            self.remote_call("delete stale asset", move || remote.delete(stale))
                .await?;
        }

        let object = keys::document_key(&key);
        let (object_ref, document) = (object.as_str(), document.as_slice());
        self.remote_call("upload document", move || remote.put(object_ref, document))
            .await?;
        debug!("Uploaded {} v{}", key, record.version);
        Ok(item)
    }

    /// Fetches a document and its assets and stores the entity locally.
    async fn download(&self, key: &NaturalKey, existing: Option<LocalId>) -> Result<ManifestItem> {
        let remote = self.remote.as_ref();
        let object = keys::document_key(key);
        let object_ref = object.as_str();
        let bytes = self
            .remote_call("fetch document", move || remote.get(object_ref))
            .await?
            .ok_or_else(|| SyncError::MissingObject(object.clone()))?;
        let document = EntityDocument::from_bytes(key, &bytes)?;

        let mut assets = BTreeMap::new();
        for entry in &document.assets {
            let object = keys::asset_key(key, &entry.file);
            let object_ref = object.as_str();
            let bytes = self
                .remote_call("fetch asset", move || remote.get(object_ref))
                .await?
                .ok_or_else(|| SyncError::MissingObject(object.clone()))?;
            assets.insert(entry.file.clone(), bytes);
        }

        let remote_ids = document.remote_reference_ids();
        let record = document.into_record(existing, assets)?;

        self.bus.publish(SyncNotification::EntityUpdating {
            kind: key.kind,
            natural_key: key.clone(),
        });
        let record = self
            .blocking(move |store| {
                let mut record = record;
                let rewrite = IdentityResolver::new(store).rewrite_references(&mut record, &remote_ids)?;
                if let Some((target, candidates)) = rewrite.conflicts.into_iter().next() {
                    return Err(SyncError::IdentityConflict {
                        key: target,
                        candidates,
                    });
                }
                let id = store.upsert(record.clone())?;
                record.id = Some(id);
                Ok(record)
            })
            .await?;
        debug!("Downloaded {} v{} as local id {:?}", key, record.version, record.id);
        ManifestItem::from_record(&record)
    }

    /// Removes a local entity on behalf of a remote deletion.
    async fn delete_local(&self, key: &NaturalKey, id: Option<LocalId>, item: &ManifestItem) -> Result<()> {
        self.bus.publish(SyncNotification::EntityUpdating {
            kind: key.kind,
            natural_key: key.clone(),
        });
        let kind = key.kind;
        let tombstone = item.to_tombstone();
        self.blocking(move |store| {
            if let Some(id) = id {
                store.delete(kind, id)?;
            }
            store.put_tombstone(tombstone)?;
            Ok(())
        })
        .await?;
        debug!("Deleted {} locally", key);
        Ok(())
    }

    /// Removes an entity's document and assets from the remote store.
    async fn delete_remote(&self, key: &NaturalKey) -> Result<()> {
        let remote = self.remote.as_ref();
        let object = keys::document_key(key);
        let object_ref = object.as_str();
        self.remote_call("delete document", move || remote.delete(object_ref))
            .await?;

        let prefix = keys::asset_prefix(key);
        let prefix_ref = prefix.as_str();
        for asset in self
            .remote_call("list assets", move || remote.list(prefix_ref))
            .await?
        {
            let asset = asset.as_str();
            self.remote_call("delete asset", move || remote.delete(asset))
                .await?;
        }
        debug!("Deleted {} remotely", key);
        Ok(())
    }

    /// Runs a remote call under the retry policy.
    async fn remote_call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CloudResult<T>>,
    {
        self.config
            .retry
            .run(operation, || call().map_err(SyncError::from))
            .await
    }

    /// Runs local store work on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&dyn LocalStateStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.local);
        tokio::task::spawn_blocking(move || work(store.as_ref()))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }
}

fn percent(index: usize, total: usize) -> u8 {
    u8::try_from(index * 100 / total.max(1)).unwrap_or(100)
}

fn missing_side(key: &NaturalKey, what: &str) -> SyncError {
    SyncError::MissingObject(format!("{what} for {key}"))
}
