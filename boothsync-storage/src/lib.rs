//! Local entity storage for boothsync.
//!
//! Each kiosk keeps its own authoritative copy of templates, events and
//! settings. The sync engine only sees them through [`LocalStateStore`], a
//! small CRUD surface keyed by store-assigned integer ids.
//!
//! # Architecture
//!
//! - Entities are stored as JSON payloads plus by-name references and
//!   binary assets
//! - Tombstones record intentional deletions that must reach other devices
//! - One opaque slot holds the last published sync manifest
//!
//! Two implementations ship here: [`MemoryStateStore`] for tests and
//! embedding, and [`SqliteStateStore`] for the kiosk's on-disk database.

mod error;
mod memory;
mod record;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStateStore;
pub use record::{EntityRecord, EntityRef, Tombstone};
pub use sqlite::SqliteStateStore;
pub use store::{retire, LocalStateStore};
