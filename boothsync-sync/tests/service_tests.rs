mod common;

use boothsync_cloud::MemoryObjectStore;
use boothsync_storage::{LocalStateStore, MemoryStateStore, SqliteStateStore};
use boothsync_sync::{ErrorKind, RemoteConfig, SyncError, SyncNotification, SyncService, SyncSettings};
use boothsync_types::{DeviceId, EntityKind};
use common::{plain_template, template, Fault, FaultyStore};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn settings(device: &str) -> SyncSettings {
    SyncSettings {
        device_id: DeviceId::new(device),
        ..SyncSettings::default()
    }
}

fn memory_service(device: &str) -> (SyncService, Arc<MemoryStateStore>) {
    let local = Arc::new(MemoryStateStore::new());
    let service = SyncService::new(
        &settings(device),
        local.clone(),
        Arc::new(MemoryObjectStore::new()),
    )
    .unwrap();
    (service, local)
}

// ── Status ───────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_service_reports_idle_status() {
    let (service, _) = memory_service("kiosk-a");

    let status = service.get_sync_status();

    assert!(status.enabled);
    assert!(status.auto_sync_enabled);
    assert_eq!(status.device_id, DeviceId::new("kiosk-a"));
    assert_eq!(status.last_sync_time, None);
    assert_eq!(status.next_sync_time, None);
    assert_eq!(status.last_sync_success, None);
    assert!(!status.running);
}

#[tokio::test]
async fn status_reflects_the_last_run() {
    let (service, local) = memory_service("kiosk-a");
    local.upsert(plain_template(&DeviceId::new("kiosk-a"), "A")).unwrap();

    let result = service.sync().await;
    let status = service.get_sync_status();

    assert!(result.success);
    assert_eq!(status.last_sync_success, Some(true));
    assert_eq!(status.last_sync_time, result.finished_at);
}

#[tokio::test]
async fn status_serializes_camel_case() {
    let (service, _) = memory_service("kiosk-a");

    let value = serde_json::to_value(service.get_sync_status()).unwrap();

    assert_eq!(value["deviceId"], "kiosk-a");
    assert_eq!(value["autoSyncEnabled"], true);
    assert!(value["lastSyncTime"].is_null());
}

#[tokio::test]
async fn start_arms_and_stop_disarms_the_timer() {
    let (service, _) = memory_service("kiosk-a");

    service.start();
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert!(service.get_sync_status().next_sync_time.is_some());

    service.stop();
    assert_eq!(service.get_sync_status().next_sync_time, None);
}

// ── Controls ─────────────────────────────────────────────────────

#[tokio::test]
async fn disabled_service_does_not_sync() {
    let (service, local) = memory_service("kiosk-a");
    local.upsert(plain_template(&DeviceId::new("kiosk-a"), "A")).unwrap();

    service.set_enabled(false);
    let result = service.sync().await;

    assert!(!result.success);
    assert!(result.has_error(ErrorKind::Aborted));
    assert!(result.outcomes.is_empty());
    let status = service.get_sync_status();
    assert!(!status.enabled);
    assert!(!status.auto_sync_enabled);
    assert_eq!(status.last_sync_success, None);
}

#[tokio::test]
async fn auto_sync_cannot_be_enabled_while_sync_is_off() {
    let (service, _) = memory_service("kiosk-a");

    service.set_enabled(false);
    service.set_auto_sync_enabled(true);
    assert!(!service.get_sync_status().auto_sync_enabled);

    service.set_enabled(true);
    service.set_auto_sync_enabled(true);
    assert!(service.get_sync_status().auto_sync_enabled);
}

#[tokio::test]
async fn interval_must_be_positive() {
    let (service, _) = memory_service("kiosk-a");

    assert!(matches!(service.set_sync_interval(0), Err(SyncError::Config(_))));
    service.set_sync_interval(5).unwrap();
    assert_eq!(service.scheduler().config().interval_minutes, 5);
}

#[test]
fn invalid_settings_are_rejected() {
    let bad = SyncSettings {
        interval_minutes: 0,
        ..settings("kiosk-a")
    };
    let created = SyncService::new(
        &bad,
        Arc::new(MemoryStateStore::new()),
        Arc::new(MemoryObjectStore::new()),
    );
    assert!(created.is_err());
}

#[tokio::test]
async fn connection_test_reports_probe_outcome() {
    let remote = FaultyStore::new();
    let service = SyncService::new(
        &settings("kiosk-a"),
        Arc::new(MemoryStateStore::new()),
        remote.clone(),
    )
    .unwrap();

    assert!(service.test_connection().await);
    remote.fail_probe(Fault::Auth);
    assert!(!service.test_connection().await);
}

// ── Notifications ────────────────────────────────────────────────

#[tokio::test]
async fn subscribers_see_run_lifecycle() {
    let (service, _) = memory_service("kiosk-a");
    let (handle, mut rx) = service.subscribe_channel();

    service.sync().await;

    assert_eq!(rx.recv().await, Some(SyncNotification::SyncStarted));
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(SyncNotification::SyncCompleted { .. })));
    assert!(service.unsubscribe(handle));
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn two_kiosks_converge_through_a_shared_folder() {
    let share = TempDir::new().unwrap();
    let remote = RemoteConfig::Filesystem {
        root: share.path().to_path_buf(),
    };
    let a_store = Arc::new(SqliteStateStore::open_in_memory().unwrap());
    let b_store = Arc::new(SqliteStateStore::open_in_memory().unwrap());
    let a = SyncService::connect(
        &SyncSettings {
            remote: remote.clone(),
            ..settings("kiosk-a")
        },
        a_store.clone(),
    )
    .await
    .unwrap();
    let b = SyncService::connect(
        &SyncSettings {
            remote,
            ..settings("kiosk-b")
        },
        b_store.clone(),
    )
    .await
    .unwrap();
    a_store.upsert(template(&DeviceId::new("kiosk-a"), "Classic")).unwrap();

    let pushed = a.sync().await;
    let pulled = b.sync().await;
    let settled = b.sync().await;

    assert!(pushed.success, "{:?}", pushed.errors);
    assert!(pulled.success, "{:?}", pulled.errors);
    assert_eq!(pulled.counts_for(EntityKind::Template).created, 1);
    assert!(settled.all_skipped());
    let copy = b_store.find_by_name(EntityKind::Template, "Classic").unwrap();
    assert_eq!(copy.len(), 1);
    assert_eq!(copy[0].assets.get("background.png"), Some(&b"png:Classic".to_vec()));
    assert!(share.path().join("sync-manifest.json").is_file());
}
