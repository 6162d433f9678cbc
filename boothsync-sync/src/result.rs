//! Per-run reporting.

use crate::diff::SyncAction;
use crate::error::{ErrorKind, SyncError};
use boothsync_types::{EntityKind, NaturalKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-kind tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl KindCounts {
    /// Items that changed something on either side.
    pub fn applied(&self) -> u32 {
        self.created + self.updated + self.deleted
    }
}

/// Final status of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Created,
    Updated,
    Deleted,
    Skipped,
    Failed(ErrorKind),
}

impl ItemStatus {
    /// Status of a successfully applied action.
    pub fn applied(action: SyncAction) -> Self {
        match action {
            SyncAction::UploadNew | SyncAction::DownloadNew => ItemStatus::Created,
            SyncAction::UploadUpdate | SyncAction::DownloadUpdate => ItemStatus::Updated,
            SyncAction::DeleteLocal | SyncAction::DeleteRemote => ItemStatus::Deleted,
            SyncAction::Skip => ItemStatus::Skipped,
        }
    }
}

/// What happened to one item, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub key: NaturalKey,
    pub action: SyncAction,
    pub status: ItemStatus,
}

/// One reported error. Run-level errors carry no key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub key: Option<NaturalKey>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Report of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub counts: BTreeMap<EntityKind, KindCounts>,
    pub errors: Vec<SyncErrorEntry>,
    pub outcomes: Vec<ItemOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Version of the manifest both sides hold after the run.
    pub global_version: Option<u64>,
}

impl SyncResult {
    /// An empty, unfinished report.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            counts: BTreeMap::new(),
            errors: Vec::new(),
            outcomes: Vec::new(),
            started_at,
            finished_at: None,
            global_version: None,
        }
    }

    /// A finished report for a run that never executed.
    pub fn aborted(kind: ErrorKind, message: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut result = Self::new(now);
        result.push_error(None, kind, message);
        result.finish(now);
        result
    }

    /// Counts for one kind (zero if nothing of that kind was touched).
    pub fn counts_for(&self, kind: EntityKind) -> KindCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    /// Records an item's outcome and updates the per-kind counts.
    pub fn record(&mut self, key: &NaturalKey, action: SyncAction, status: ItemStatus) {
        let counts = self.counts.entry(key.kind).or_default();
        match status {
            ItemStatus::Created => counts.created += 1,
            ItemStatus::Updated => counts.updated += 1,
            ItemStatus::Deleted => counts.deleted += 1,
            ItemStatus::Skipped => counts.skipped += 1,
            ItemStatus::Failed(_) => counts.failed += 1,
        }
        self.outcomes.push(ItemOutcome {
            key: key.clone(),
            action,
            status,
        });
    }

    /// Records a failed item together with its error.
    pub fn record_failure(&mut self, key: &NaturalKey, action: SyncAction, error: &SyncError) {
        let kind = error.kind();
        self.record(key, action, ItemStatus::Failed(kind));
        self.push_error(Some(key.clone()), kind, error.to_string());
    }

    pub fn push_error(&mut self, key: Option<NaturalKey>, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(SyncErrorEntry {
            key,
            kind,
            message: message.into(),
        });
    }

    /// Seals the report. The run succeeded only if nothing was reported.
    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.success = self.errors.is_empty();
        self.finished_at = Some(finished_at);
    }

    /// Outcome of one item, if it was processed.
    pub fn outcome(&self, key: &NaturalKey) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    /// True if every processed item was skipped.
    pub fn all_skipped(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == ItemStatus::Skipped)
    }

    /// Returns true if any error carries `kind`.
    pub fn has_error(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    /// Some items failed while others were applied and stay applied.
    pub fn is_partial_failure(&self) -> bool {
        !self.success
            && self.outcomes.iter().any(|o| {
                matches!(
                    o.status,
                    ItemStatus::Created | ItemStatus::Updated | ItemStatus::Deleted
                )
            })
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let total = self
            .counts
            .values()
            .fold(KindCounts::default(), |acc, c| KindCounts {
                created: acc.created + c.created,
                updated: acc.updated + c.updated,
                deleted: acc.deleted + c.deleted,
                skipped: acc.skipped + c.skipped,
                failed: acc.failed + c.failed,
            });
        format!(
            "{}: {} created, {} updated, {} deleted, {} skipped, {} failed, {} errors",
            if self.success { "ok" } else { "failed" },
            total.created,
            total.updated,
            total.deleted,
            total.skipped,
            total.failed,
            self.errors.len()
        )
    }
}
