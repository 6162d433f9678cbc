//! Entity kinds and natural keys.
//!
//! A natural key is the `(kind, name)` pair that identifies an entity on
//! every device. Local integer ids are reassigned on re-import; natural keys
//! are not.

use crate::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The kinds of entity kept in sync between kiosks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A design template (layout plus background assets).
    Template,
    /// An event, which references the templates it prints with.
    Event,
    /// A single named application setting.
    Setting,
}

impl EntityKind {
    /// All kinds, in sync order.
    pub const ALL: [EntityKind; 3] = [EntityKind::Template, EntityKind::Event, EntityKind::Setting];

    /// Wire name used in manifests and entity documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Template => "template",
            EntityKind::Event => "event",
            EntityKind::Setting => "setting",
        }
    }

    /// Directory holding this kind's documents in the remote store.
    #[must_use]
    pub const fn remote_dir(&self) -> &'static str {
        match self {
            EntityKind::Template => "templates",
            EntityKind::Event => "events",
            EntityKind::Setting => "settings",
        }
    }

    /// Position in sync order. Referenced kinds sort before the kinds
    /// that reference them, so templates land before events.
    #[must_use]
    pub const fn sync_rank(&self) -> u8 {
        match self {
            EntityKind::Template => 0,
            EntityKind::Event => 1,
            EntityKind::Setting => 2,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template" => Ok(EntityKind::Template),
            "event" => Ok(EntityKind::Event),
            "setting" => Ok(EntityKind::Setting),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }
}

/// Stable cross-device identity of an entity.
///
/// Serialized as `"<kind>/<name>"`. The name may itself contain `/`; only
/// the first separator splits kind from name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub kind: EntityKind,
    pub name: String,
}

impl NaturalKey {
    /// Creates a natural key.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Parses `"<kind>/<name>"`. Accepts every string `Display` produces,
    /// including an empty name.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidKey(s.to_string()))?;
        Ok(Self::new(kind.parse()?, name))
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by sync rank first, then name.
impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.kind
            .sync_rank()
            .cmp(&other.kind.sync_rank())
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for NaturalKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NaturalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NaturalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
