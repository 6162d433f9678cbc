//! Manifest diff.

use crate::manifest::{Manifest, ManifestItem};
use boothsync_types::NaturalKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// What to do with one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    UploadNew,
    UploadUpdate,
    DownloadNew,
    DownloadUpdate,
    DeleteLocal,
    DeleteRemote,
    Skip,
}

impl SyncAction {
    pub fn is_delete(&self) -> bool {
        matches!(self, SyncAction::DeleteLocal | SyncAction::DeleteRemote)
    }

    pub fn is_download(&self) -> bool {
        matches!(self, SyncAction::DownloadNew | SyncAction::DownloadUpdate)
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, SyncAction::UploadNew | SyncAction::UploadUpdate)
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncAction::UploadNew => "upload",
            SyncAction::UploadUpdate => "upload update",
            SyncAction::DownloadNew => "download",
            SyncAction::DownloadUpdate => "download update",
            SyncAction::DeleteLocal => "delete local",
            SyncAction::DeleteRemote => "delete remote",
            SyncAction::Skip => "skip",
        };
        f.write_str(name)
    }
}

/// One entry of the operation list, with the two items that were compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperation {
    pub action: SyncAction,
    pub key: NaturalKey,
    pub local: Option<ManifestItem>,
    pub remote: Option<ManifestItem>,
}

/// Decides the action for one natural key.
pub fn resolve(local: Option<&ManifestItem>, remote: Option<&ManifestItem>) -> SyncAction {
    match (local, remote) {
        (None, None) => SyncAction::Skip,
        (Some(l), None) if l.deleted => SyncAction::DeleteRemote,
        (Some(_), None) => SyncAction::UploadNew,
        (None, Some(r)) if r.deleted => SyncAction::Skip,
        (None, Some(_)) => SyncAction::DownloadNew,
        (Some(l), Some(r)) if l.same_content(r) => SyncAction::Skip,
        (Some(l), Some(r)) => match l.recency_cmp(r) {
            Ordering::Greater if l.deleted => SyncAction::DeleteRemote,
            Ordering::Greater => SyncAction::UploadUpdate,
            // Identical metadata with different content converges on the
            // shared copy.
            Ordering::Less | Ordering::Equal if r.deleted => SyncAction::DeleteLocal,
            Ordering::Less | Ordering::Equal if l.deleted => SyncAction::DownloadNew,
            Ordering::Less | Ordering::Equal => SyncAction::DownloadUpdate,
        },
    }
}

/// Computes the ordered operation list reconciling `local` with `remote`.
///
/// Every natural key present on either side yields exactly one operation.
/// Non-delete operations come first, deletions last; within each group
/// operations follow sync order (kind rank, then name).
pub fn diff(local: &Manifest, remote: &Manifest) -> Vec<SyncOperation> {
    let keys: BTreeSet<&NaturalKey> = local
        .items()
        .chain(remote.items())
        .map(|item| &item.natural_key)
        .collect();

    let mut ops: Vec<SyncOperation> = keys
        .into_iter()
        .map(|key| {
            let l = local.get(key);
            let r = remote.get(key);
            SyncOperation {
                action: resolve(l, r),
                key: key.clone(),
                local: l.cloned(),
                remote: r.cloned(),
            }
        })
        .collect();

    // Stable: keeps sync order inside each group.
    ops.sort_by_key(|op| op.action.is_delete());
    ops
}
