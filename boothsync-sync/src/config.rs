//! Sync settings.
//!
//! Settings come from a JSON file, then `BOOTHSYNC_*` environment
//! variables, then command-line flags (applied by the binary).

use crate::error::{Result, SyncError};
use crate::orchestrator::OrchestratorConfig;
use crate::retry::RetryPolicy;
use crate::scheduler::ScheduleConfig;
use boothsync_cloud::{FsObjectStore, MemoryObjectStore, RemoteObjectStore, S3Config, S3ObjectStore};
use boothsync_types::{DeviceId, EntityKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Which entity kinds take part in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncKinds {
    pub templates: bool,
    pub events: bool,
    pub settings: bool,
}

impl Default for SyncKinds {
    fn default() -> Self {
        Self::all()
    }
}

impl SyncKinds {
    pub const fn all() -> Self {
        Self {
            templates: true,
            events: true,
            settings: true,
        }
    }

    pub fn is_enabled(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Template => self.templates,
            EntityKind::Event => self.events,
            EntityKind::Setting => self.settings,
        }
    }

    /// Enabled kinds in sync order.
    pub fn enabled(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|k| self.is_enabled(*k))
            .collect()
    }
}

/// Where the shared store lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// Process-local store; only useful for tests and dry runs.
    #[default]
    Memory,
    /// A directory, typically a mounted network share.
    Filesystem { root: PathBuf },
    S3(S3Config),
}

impl RemoteConfig {
    /// Builds the configured store. Does not probe it.
    pub async fn connect(&self) -> Result<Arc<dyn RemoteObjectStore>> {
        Ok(match self {
            RemoteConfig::Memory => Arc::new(MemoryObjectStore::new()),
            RemoteConfig::Filesystem { root } => Arc::new(FsObjectStore::new(root.clone())),
            RemoteConfig::S3(config) => Arc::new(S3ObjectStore::connect(config).await?),
        })
    }
}

/// Everything a device needs to sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub device_id: DeviceId,
    /// Master switch; when off no run is started, manual or scheduled.
    pub enabled: bool,
    pub auto_sync: bool,
    pub interval_minutes: u32,
    pub kinds: SyncKinds,
    pub retry: RetryPolicy,
    pub run_timeout_secs: u64,
    pub remote: RemoteConfig,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            device_id: DeviceId::generate(),
            enabled: true,
            auto_sync: true,
            interval_minutes: 15,
            kinds: SyncKinds::all(),
            retry: RetryPolicy::default(),
            run_timeout_secs: 600,
            remote: RemoteConfig::default(),
        }
    }
}

impl SyncSettings {
    /// Reads settings from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings = serde_json::from_str(&text)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Writes settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .map_err(|e| SyncError::Config(format!("cannot write {}: {e}", path.display())))
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("BOOTHSYNC_DEVICE_ID") {
            self.device_id = DeviceId::new(id);
        }
        if let Some(v) = lookup("BOOTHSYNC_ENABLED") {
            self.enabled = parse_bool("BOOTHSYNC_ENABLED", &v)?;
        }
        if let Some(v) = lookup("BOOTHSYNC_AUTO_SYNC") {
            self.auto_sync = parse_bool("BOOTHSYNC_AUTO_SYNC", &v)?;
        }
        if let Some(v) = lookup("BOOTHSYNC_INTERVAL_MINUTES") {
            self.interval_minutes = v.trim().parse().map_err(|_| {
                SyncError::Config(format!("BOOTHSYNC_INTERVAL_MINUTES: not a number: {v:?}"))
            })?;
        }
        if let Some(v) = lookup("BOOTHSYNC_SYNC_TEMPLATES") {
            self.kinds.templates = parse_bool("BOOTHSYNC_SYNC_TEMPLATES", &v)?;
        }
        if let Some(v) = lookup("BOOTHSYNC_SYNC_EVENTS") {
            self.kinds.events = parse_bool("BOOTHSYNC_SYNC_EVENTS", &v)?;
        }
        if let Some(v) = lookup("BOOTHSYNC_SYNC_SETTINGS") {
            self.kinds.settings = parse_bool("BOOTHSYNC_SYNC_SETTINGS", &v)?;
        }

        if let Some(root) = lookup("BOOTHSYNC_REMOTE_DIR") {
            self.remote = RemoteConfig::Filesystem { root: root.into() };
        }
        if let Some(bucket) = lookup("BOOTHSYNC_S3_BUCKET") {
            let mut s3 = match std::mem::take(&mut self.remote) {
                RemoteConfig::S3(existing) => existing,
                _ => S3Config::default(),
            };
            s3.bucket = bucket;
            self.remote = RemoteConfig::S3(s3);
        }
        if let RemoteConfig::S3(s3) = &mut self.remote {
            if let Some(region) = lookup("BOOTHSYNC_S3_REGION") {
                s3.region = region;
            }
            if let Some(endpoint) = lookup("BOOTHSYNC_S3_ENDPOINT") {
                s3.endpoint = Some(endpoint);
            }
            if let Some(key) = lookup("BOOTHSYNC_S3_ACCESS_KEY_ID") {
                s3.access_key_id = Some(key);
            }
            if let Some(secret) = lookup("BOOTHSYNC_S3_SECRET_ACCESS_KEY") {
                s3.secret_access_key = Some(secret);
            }
            if let Some(prefix) = lookup("BOOTHSYNC_S3_PREFIX") {
                s3.prefix = Some(prefix);
            }
        }
        Ok(())
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            return Err(SyncError::Config("interval_minutes must be at least 1".into()));
        }
        if self.run_timeout_secs == 0 {
            return Err(SyncError::Config("run_timeout_secs must be at least 1".into()));
        }
        if self.device_id.as_str().is_empty() {
            return Err(SyncError::Config("device_id must not be empty".into()));
        }
        if let RemoteConfig::S3(s3) = &self.remote {
            if s3.bucket.is_empty() {
                return Err(SyncError::Config("S3 remote needs a bucket".into()));
            }
        }
        Ok(())
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            enabled: self.enabled && self.auto_sync,
            interval_minutes: self.interval_minutes,
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            device_id: self.device_id.clone(),
            kinds: self.kinds,
            retry: self.retry.clone(),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SyncError::Config(format!("{name}: expected a boolean, got {value:?}"))),
    }
}
