//! Service facade consumed by the UI, the CLI and test harnesses.

use crate::config::SyncSettings;
use crate::error::{ErrorKind, Result};
use crate::notify::{NotificationBus, SubscriptionHandle, SyncNotification};
use crate::orchestrator::SyncOrchestrator;
use crate::result::SyncResult;
use crate::scheduler::SyncScheduler;
use boothsync_cloud::RemoteObjectStore;
use boothsync_storage::LocalStateStore;
use boothsync_types::DeviceId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// Snapshot returned by [`SyncService::get_sync_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub enabled: bool,
    pub auto_sync_enabled: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub next_sync_time: Option<DateTime<Utc>>,
    pub device_id: DeviceId,
    pub running: bool,
    pub last_sync_success: Option<bool>,
}

/// One device's sync engine, wired together.
///
/// Constructed explicitly by whatever composes the application; there is
/// no global instance.
pub struct SyncService {
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: SyncScheduler,
    bus: Arc<NotificationBus>,
    enabled: AtomicBool,
}

impl SyncService {
    /// Wires a service around existing stores. Validates the settings.
    pub fn new(
        settings: &SyncSettings,
        local: Arc<dyn LocalStateStore>,
        remote: Arc<dyn RemoteObjectStore>,
    ) -> Result<Self> {
        settings.validate()?;
        let bus = Arc::new(NotificationBus::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            local,
            remote,
            Arc::clone(&bus),
            settings.orchestrator_config(),
        ));
        let scheduler = SyncScheduler::new(Arc::clone(&orchestrator), settings.schedule())?;
        info!(
            "Sync service ready for device {} (interval {} min)",
            settings.device_id, settings.interval_minutes
        );
        Ok(Self {
            orchestrator,
            scheduler,
            bus,
            enabled: AtomicBool::new(settings.enabled),
        })
    }

    /// Builds the configured remote store, then wires the service.
    pub async fn connect(settings: &SyncSettings, local: Arc<dyn LocalStateStore>) -> Result<Self> {
        settings.validate()?;
        let remote = settings.remote.connect().await?;
        Self::new(settings, local, remote)
    }

    /// Arms the periodic trigger.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Disarms the periodic trigger; a run in flight completes.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        let last = self.scheduler.last_result();
        SyncStatus {
            enabled: self.enabled.load(Ordering::Relaxed),
            auto_sync_enabled: self.scheduler.config().enabled,
            last_sync_time: last.as_ref().and_then(|r| r.finished_at),
            next_sync_time: self.scheduler.next_sync_time(),
            device_id: self.orchestrator.device_id().clone(),
            running: self.scheduler.is_running(),
            last_sync_success: last.map(|r| r.success),
        }
    }

    /// Returns true if the remote store answers and accepts the credentials.
    pub async fn test_connection(&self) -> bool {
        match self.orchestrator.probe().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Connection test failed: {}", e);
                false
            }
        }
    }

    /// Runs a sync now, sharing any run already in flight.
    pub async fn sync(&self) -> SyncResult {
        if !self.enabled.load(Ordering::Relaxed) {
            return SyncResult::aborted(ErrorKind::Aborted, "sync is disabled on this device");
        }
        self.scheduler.trigger_now().await
    }

    pub fn set_sync_interval(&self, minutes: u32) -> Result<()> {
        self.scheduler.set_interval(minutes)
    }

    pub fn set_auto_sync_enabled(&self, enabled: bool) {
        self.scheduler
            .set_enabled(enabled && self.enabled.load(Ordering::Relaxed));
    }

    /// Turns sync on or off altogether.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.scheduler.set_enabled(false);
        }
    }

    /// Registers a notification callback. Must be called inside a Tokio
    /// runtime.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: FnMut(SyncNotification) + Send + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionHandle, UnboundedReceiver<SyncNotification>) {
        self.bus.subscribe_channel()
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }
}
