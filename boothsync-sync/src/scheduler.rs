//! Periodic and manual triggering of sync runs with a single-flight guard.
//!
//! Every run, scheduled or manual, goes through [`SyncScheduler::trigger_now`].
//! A run executes on its own task, so dropping a caller or stopping the
//! scheduler never cancels it; callers arriving while it is in flight
//! share its result.

use crate::error::{ErrorKind, Result, SyncError};
use crate::orchestrator::SyncOrchestrator;
use crate::result::SyncResult;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Periodic trigger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Minutes between scheduled runs; at least 1.
    pub interval_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 15,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

type InFlight = Shared<BoxFuture<'static, SyncResult>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    orchestrator: Arc<SyncOrchestrator>,
    config: watch::Sender<ScheduleConfig>,
    in_flight: Mutex<Option<InFlight>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    next_run: Mutex<Option<DateTime<Utc>>>,
    last_result: Mutex<Option<SyncResult>>,
}

/// Owns the periodic timer and the single-flight guard.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    /// Creates a scheduler. Nothing runs until [`start`](Self::start) or
    /// [`trigger_now`](Self::trigger_now). Fails on a zero interval.
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: ScheduleConfig) -> Result<Self> {
        validate_interval(config.interval_minutes)?;
        let (config, _) = watch::channel(config);
        Ok(Self {
            inner: Arc::new(Inner {
                orchestrator,
                config,
                in_flight: Mutex::new(None),
                timer: Mutex::new(None),
                next_run: Mutex::new(None),
                last_result: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> ScheduleConfig {
        *self.inner.config.borrow()
    }

    /// Runs a sync now, or joins the run already in flight.
    pub async fn trigger_now(&self) -> SyncResult {
        self.join_or_launch().await
    }

    fn join_or_launch(&self) -> InFlight {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(run) = slot.as_ref() {
            debug!("Sync already in flight, joining it");
            return run.clone();
        }

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = AssertUnwindSafe(inner.orchestrator.run_once())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    warn!("Sync run panicked");
                    SyncResult::aborted(ErrorKind::Aborted, "sync run panicked")
                });
            *lock(&inner.last_result) = Some(result.clone());
            lock(&inner.in_flight).take();
            let _ = tx.send(result);
        });

        let run = async move {
            rx.await.unwrap_or_else(|_| {
                SyncResult::aborted(ErrorKind::Aborted, "sync task ended without a result")
            })
        }
        .boxed()
        .shared();
        *slot = Some(run.clone());
        run
    }

    /// Returns true while a run is in flight.
    pub fn is_running(&self) -> bool {
        lock(&self.inner.in_flight).is_some()
    }

    /// Result of the last completed run.
    pub fn last_result(&self) -> Option<SyncResult> {
        lock(&self.inner.last_result).clone()
    }

    /// When the periodic trigger will next fire, if armed and enabled.
    pub fn next_sync_time(&self) -> Option<DateTime<Utc>> {
        *lock(&self.inner.next_run)
    }

    /// Returns true if the periodic task is armed.
    pub fn is_started(&self) -> bool {
        lock(&self.inner.timer).is_some()
    }

    /// Arms the periodic trigger. No-op if already armed.
    pub fn start(&self) {
        let mut timer = lock(&self.inner.timer);
        if timer.is_some() {
            return;
        }
        let scheduler = self.clone();
        *timer = Some(tokio::spawn(async move { scheduler.periodic().await }));
        info!("Sync scheduler started");
    }

    /// Disarms the periodic trigger. A run in flight completes normally.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.inner.timer).take() {
            handle.abort();
            info!("Sync scheduler stopped");
        }
        *lock(&self.inner.next_run) = None;
    }

    /// Changes the interval. Applies from the next scheduling cycle; a run in
    /// flight is not interrupted.
    pub fn set_interval(&self, minutes: u32) -> Result<()> {
        validate_interval(minutes)?;
        self.inner.config.send_modify(|c| c.interval_minutes = minutes);
        info!("Sync interval set to {} min", minutes);
        Ok(())
    }

    /// Enables or disables the periodic trigger without disarming the task.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.config.send_modify(|c| c.enabled = enabled);
        info!("Auto sync {}", if enabled { "enabled" } else { "disabled" });
    }

    async fn periodic(&self) {
        let mut config_rx = self.inner.config.subscribe();
        loop {
            let config = *config_rx.borrow_and_update();
            if !config.enabled {
                *lock(&self.inner.next_run) = None;
                if config_rx.changed().await.is_err() {
                    return;
                }
                continue;
            }

            let interval = config.interval();
            let deadline = chrono::Duration::from_std(interval)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d));
            *lock(&self.inner.next_run) = deadline;
            debug!("Next scheduled sync in {:?}", interval);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    *lock(&self.inner.next_run) = None;
                    let result = self.trigger_now().await;
                    if !result.success {
                        warn!("Scheduled sync failed: {}", result.summary());
                    }
                }
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn validate_interval(minutes: u32) -> Result<()> {
    if minutes == 0 {
        return Err(SyncError::Config("sync interval must be at least 1 minute".into()));
    }
    Ok(())
}
