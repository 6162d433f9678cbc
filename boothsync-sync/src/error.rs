//! Error types for the sync layer.

use boothsync_cloud::CloudError;
use boothsync_storage::StorageError;
use boothsync_types::{LocalId, NaturalKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote store failure.
    #[error("remote store error: {0}")]
    Cloud(#[from] CloudError),

    /// Local store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key or kind could not be parsed.
    #[error(transparent)]
    Types(#[from] boothsync_types::Error),

    /// An entity document failed validation.
    #[error("invalid document for {key}: {reason}")]
    InvalidDocument { key: NaturalKey, reason: String },

    /// The manifest lists an object the remote store does not (yet) hold.
    #[error("remote object missing: {0}")]
    MissingObject(String),

    /// Several local entities share a natural key.
    #[error("identity conflict for {key}: local ids {candidates:?}")]
    IdentityConflict {
        key: NaturalKey,
        candidates: Vec<LocalId>,
    },

    /// The whole run exceeded its time bound.
    #[error("sync run timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid settings.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A blocking store task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Classifies the error for a [`SyncResult`](crate::SyncResult) report.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Cloud(e) if e.is_auth() => ErrorKind::Auth,
            SyncError::Cloud(_) | SyncError::MissingObject(_) => ErrorKind::Connectivity,
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::Storage(_) | SyncError::Task(_) => ErrorKind::Storage,
            SyncError::Serialization(_)
            | SyncError::Types(_)
            | SyncError::InvalidDocument { .. } => ErrorKind::Serialization,
            SyncError::IdentityConflict { .. } => ErrorKind::IdentityConflict,
            SyncError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Cloud(e) if e.is_transient())
    }

    /// Returns true for credential failures, which end the run.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Cloud(e) if e.is_auth())
    }
}

/// Error category recorded in a sync report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or remote store failure, after retries.
    Connectivity,
    /// Invalid or expired remote credentials.
    Auth,
    /// Duplicate natural keys on this device.
    IdentityConflict,
    /// The remote manifest could not be parsed.
    ManifestCorruption,
    /// Local store failure.
    Storage,
    /// A document or manifest item could not be encoded or decoded.
    Serialization,
    /// The run exceeded its time bound.
    Timeout,
    /// The run never executed (sync disabled, worker lost).
    Aborted,
    /// Settings were rejected.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Auth => "auth",
            ErrorKind::IdentityConflict => "identity_conflict",
            ErrorKind::ManifestCorruption => "manifest_corruption",
            ErrorKind::Storage => "storage",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Aborted => "aborted",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}
