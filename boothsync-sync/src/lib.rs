//! Manifest-based sync engine for boothsync kiosks.
//!
//! Keeps each kiosk's local entity store (templates, events, settings)
//! consistent with a shared remote object store.
//!
//! # Architecture
//!
//! Entities are identified across devices by their natural key
//! (`kind/name`), never by local integer ids. Every run compares a manifest
//! of the local store with the shared manifest and applies the difference
//! one entity at a time.
//!
//! ## Components
//!
//! - **ManifestManager**: builds, fetches, diffs and publishes manifests
//! - **IdentityResolver**: maps natural keys to local ids, refusing to guess
//!   on duplicates
//! - **SyncOrchestrator**: runs the phases of one pass and reports per item
//! - **SyncScheduler**: periodic trigger plus single-flight manual trigger
//! - **NotificationBus**: non-blocking fan-out of lifecycle events
//! - **SyncService**: the facade the application talks to
//!
//! ## Sync Process
//!
//! 1. **Checking**: probe the remote store
//! 2. **Diffing**: build the local manifest, fetch the remote one, diff
//! 3. **Transferring**: upload, download and delete, with retries
//! 4. **Reconciling**: re-derive references, publish the merged manifest
//!
//! # Example
//!
//! ```
//! use boothsync_cloud::MemoryObjectStore;
//! use boothsync_storage::MemoryStateStore;
//! use boothsync_sync::{SyncService, SyncSettings};
//! use std::sync::Arc;
//!
//! let settings = SyncSettings::default();
//! let service = SyncService::new(
//!     &settings,
//!     Arc::new(MemoryStateStore::new()),
//!     Arc::new(MemoryObjectStore::new()),
//! )
//! .unwrap();
//! assert!(service.get_sync_status().enabled);
//! ```

mod config;
pub mod diff;
mod document;
mod error;
mod identity;
pub mod keys;
mod manifest;
mod notify;
mod orchestrator;
mod result;
mod retry;
mod scheduler;
mod service;

pub use config::{RemoteConfig, SyncKinds, SyncSettings};
pub use diff::{diff, SyncAction, SyncOperation};
pub use document::{AssetEntry, DocumentReference, EntityDocument};
pub use error::{ErrorKind, Result, SyncError};
pub use identity::{
    IdentityMapping, IdentityResolver, ReconcileReport, ReferenceConflict, Resolution, Rewrite,
};
pub use manifest::{LocalSnapshot, Manifest, ManifestItem, ManifestManager, RemoteManifest};
pub use notify::{NotificationBus, SubscriptionHandle, SyncNotification};
pub use orchestrator::{OrchestratorConfig, SyncOrchestrator, SyncPhase};
pub use result::{ItemOutcome, ItemStatus, KindCounts, SyncErrorEntry, SyncResult};
pub use retry::RetryPolicy;
pub use scheduler::{ScheduleConfig, SyncScheduler};
pub use service::{SyncService, SyncStatus};
