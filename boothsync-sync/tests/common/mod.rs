//! Shared fixtures for the sync integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use boothsync_cloud::{CloudError, CloudResult, MemoryObjectStore, RemoteObjectStore};
use boothsync_storage::{EntityRecord, LocalStateStore, MemoryStateStore};
use boothsync_sync::{NotificationBus, OrchestratorConfig, RetryPolicy, SyncOrchestrator};
use boothsync_types::{DeviceId, EntityKind, LocalId};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fault injection ──────────────────────────────────────────────

/// Kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Network,
    Auth,
}

impl Fault {
    fn error(&self, key: &str) -> CloudError {
        match self {
            Fault::Network => CloudError::Network(format!("connection reset while touching {key}")),
            Fault::Auth => CloudError::AuthFailed("AccessDenied: token revoked".to_string()),
        }
    }
}

/// A memory store that can be told to fail.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryObjectStore,
    faults: Mutex<HashMap<String, Fault>>,
    probe_fault: Mutex<Option<Fault>>,
    probe_delay: Mutex<Duration>,
    probes: AtomicUsize,
    puts: Mutex<HashMap<String, usize>>,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inner(&self) -> &MemoryObjectStore {
        &self.inner
    }

    /// Every call touching `key` fails with `fault`.
    pub fn fail_key(&self, key: &str, fault: Fault) {
        self.faults.lock().unwrap().insert(key.to_string(), fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
        *self.probe_fault.lock().unwrap() = None;
    }

    pub fn fail_probe(&self, fault: Fault) {
        *self.probe_fault.lock().unwrap() = Some(fault);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = delay;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// How many times `put` was attempted for `key`.
    pub fn put_attempts(&self, key: &str) -> usize {
        self.puts.lock().unwrap().get(key).copied().unwrap_or_default()
    }

    fn check(&self, key: &str) -> CloudResult<()> {
        match self.faults.lock().unwrap().get(key) {
            Some(fault) => Err(fault.error(key)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteObjectStore for FaultyStore {
    fn provider_name(&self) -> &'static str {
        "faulty"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> CloudResult<()> {
        *self.puts.lock().unwrap().entry(key.to_string()).or_default() += 1;
        self.check(key)?;
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> CloudResult<Option<Vec<u8>>> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> CloudResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> CloudResult<()> {
        self.check(key)?;
        self.inner.delete(key).await
    }

    async fn probe(&self) -> CloudResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fault = *self.probe_fault.lock().unwrap();
        match fault {
            Some(fault) => Err(fault.error("probe")),
            None => Ok(()),
        }
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// A fixed point in time, `secs` after a base instant.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn template(device: &DeviceId, name: &str) -> EntityRecord {
    let mut record = EntityRecord::new(
        EntityKind::Template,
        name,
        json!({ "layout": "2x2", "title": name }),
        device,
    )
    .with_asset("background.png", format!("png:{name}").into_bytes());
    record.modified_at = at(0);
    record
}

pub fn plain_template(device: &DeviceId, name: &str) -> EntityRecord {
    let mut record = EntityRecord::new(
        EntityKind::Template,
        name,
        json!({ "layout": "strip" }),
        device,
    );
    record.modified_at = at(0);
    record
}

pub fn event(device: &DeviceId, name: &str, template: &str, template_id: Option<LocalId>) -> EntityRecord {
    let mut record = EntityRecord::new(
        EntityKind::Event,
        name,
        json!({ "venue": "Hall B", "copies": 2 }),
        device,
    )
    .with_reference(EntityKind::Template, template, template_id);
    record.modified_at = at(0);
    record
}

pub fn setting(device: &DeviceId, name: &str, value: serde_json::Value) -> EntityRecord {
    let mut record = EntityRecord::new(EntityKind::Setting, name, json!({ "value": value }), device);
    record.modified_at = at(0);
    record
}

// ── Kiosks ───────────────────────────────────────────────────────

/// Routes engine logs to the test harness; set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Orchestrator settings with millisecond backoff.
pub fn fast_config(device: &DeviceId) -> OrchestratorConfig {
    OrchestratorConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        run_timeout: Duration::from_secs(30),
        ..OrchestratorConfig::new(device.clone())
    }
}

/// One simulated device.
pub struct Kiosk {
    pub device: DeviceId,
    pub local: Arc<MemoryStateStore>,
    pub bus: Arc<NotificationBus>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Kiosk {
    pub fn new(name: &str, remote: Arc<dyn RemoteObjectStore>) -> Self {
        let device = DeviceId::new(name);
        let config = fast_config(&device);
        Self::with_config(config, remote)
    }

    pub fn with_config(config: OrchestratorConfig, remote: Arc<dyn RemoteObjectStore>) -> Self {
        init_tracing();
        let local = Arc::new(MemoryStateStore::new());
        let bus = Arc::new(NotificationBus::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            local.clone(),
            remote,
            bus.clone(),
            config.clone(),
        ));
        Self {
            device: config.device_id,
            local,
            bus,
            orchestrator,
        }
    }

    pub fn add(&self, record: EntityRecord) -> LocalId {
        self.local.upsert(record).unwrap()
    }

    /// The single record named `name`.
    pub fn find(&self, kind: EntityKind, name: &str) -> Option<EntityRecord> {
        let mut found = self.local.find_by_name(kind, name).unwrap();
        assert!(found.len() <= 1, "duplicate {kind}/{name}");
        found.pop()
    }

    /// Edits a record as the kiosk UI would, then pins its timestamp.
    pub fn edit(&self, kind: EntityKind, name: &str, data: serde_json::Value, when: DateTime<Utc>) {
        let mut record = self.find(kind, name).expect("record to edit");
        record.data = data;
        record.touch(&self.device);
        record.modified_at = when;
        self.local.upsert(record).unwrap();
    }
}
