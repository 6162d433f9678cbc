//! Notification bus for sync lifecycle events.
//!
//! Every subscriber owns an unbounded queue. `publish` only enqueues, so it
//! never waits on a subscriber; each queue is drained in publish order, and
//! a slow subscriber only delays itself. Subscribers whose receiving side
//! is gone are dropped on the next publish.

use crate::orchestrator::SyncPhase;
use crate::result::SyncResult;
use boothsync_types::{EntityKind, NaturalKey};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Events published during a sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncNotification {
    SyncStarted,
    /// The orchestrator entered a new phase.
    PhaseChanged {
        phase: SyncPhase,
    },
    SyncProgress {
        message: String,
        /// 0..=100.
        percent: u8,
    },
    /// A local entity is about to be replaced or removed with remote data.
    #[serde(rename_all = "camelCase")]
    EntityUpdating {
        kind: EntityKind,
        natural_key: NaturalKey,
    },
    SyncCompleted {
        result: SyncResult,
    },
}

/// Identifies a subscription for [`NotificationBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    id: u64,
    tx: UnboundedSender<SyncNotification>,
}

/// Fan-out of [`SyncNotification`]s.
#[derive(Default)]
pub struct NotificationBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a receiver-style subscriber.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, UnboundedReceiver<SyncNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber { id, tx });
        (SubscriptionHandle(id), rx)
    }

    /// Registers a callback. The callback runs on its own task, one event at
    /// a time; must be called inside a Tokio runtime.
    pub fn subscribe<F>(&self, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(SyncNotification) + Send + 'static,
    {
        let (handle, mut rx) = self.subscribe_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event);
            }
        });
        handle
    }

    /// Removes a subscriber. Events already queued are still delivered.
    /// Returns false if the handle was unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != handle.0);
        subscribers.len() != before
    }

    /// Delivers an event to every live subscriber.
    pub fn publish(&self, event: SyncNotification) {
        let mut subscribers = self.lock();
        trace!("Publishing {:?} to {} subscribers", event, subscribers.len());
        subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}
