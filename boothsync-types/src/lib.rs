//! Core type definitions for boothsync.
//!
//! This crate defines the identity types shared by every other crate:
//! - Entity kinds and natural keys (the cross-device identity)
//! - Store-assigned local ids and device identifiers
//! - Content hashes over an entity's semantic fields
//!
//! Entity payloads themselves are opaque JSON owned by the kiosk
//! application; nothing here interprets them.

mod hash;
mod ids;
mod key;

pub use hash::ContentHash;
pub use ids::{DeviceId, LocalId};
pub use key::{EntityKind, NaturalKey};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("invalid natural key: {0}")]
    InvalidKey(String),
}
