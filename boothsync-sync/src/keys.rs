//! Remote key layout.
//!
//! ```text
//! sync-manifest.json
//! templates/<name>.json
//! templates/assets/<name>/<assetFile>
//! events/<name>.json
//! settings/<key>.json
//! ```
//!
//! Names and asset file names are percent-encoded so a `/` in a name cannot
//! escape its directory. A leading `.` is encoded as well, so no segment is
//! `.`, `..` or a hidden file.

use boothsync_storage::EntityRecord;
use boothsync_types::NaturalKey;
use std::borrow::Cow;
use urlencoding::encode;

/// Well-known key of the shared manifest.
pub const MANIFEST_KEY: &str = "sync-manifest.json";

fn segment(raw: &str) -> Cow<'_, str> {
    match raw.strip_prefix('.') {
        Some(rest) => Cow::Owned(format!("%2E{}", encode(rest))),
        None => encode(raw),
    }
}

/// Key of an entity's JSON document.
pub fn document_key(key: &NaturalKey) -> String {
    format!("{}/{}.json", key.kind.remote_dir(), segment(&key.name))
}

/// Prefix under which an entity's binary assets live.
pub fn asset_prefix(key: &NaturalKey) -> String {
    format!("{}/assets/{}/", key.kind.remote_dir(), segment(&key.name))
}

/// Key of one binary asset.
pub fn asset_key(key: &NaturalKey, file: &str) -> String {
    format!("{}{}", asset_prefix(key), segment(file))
}

/// Rejects names that have no place in the remote layout.
pub fn check_name(key: &NaturalKey) -> Result<(), String> {
    if key.name.is_empty() {
        return Err("entity name is empty".to_string());
    }
    Ok(())
}

/// Rejects records whose document or assets cannot be stored remotely.
pub fn check_storable(record: &EntityRecord) -> Result<(), String> {
    check_name(&record.natural_key())?;
    if record.assets.keys().any(|file| file.is_empty()) {
        return Err("asset file name is empty".to_string());
    }
    Ok(())
}
