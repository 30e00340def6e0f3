//! # System Monitor
//!
//! Mirrors host connectivity and a heartbeat into the `system` slice.
//!
//! ```text
//! host online/offline event ──▶ set_online(bool) ──▶ system.onlineStatus
//!                                (transitions only)
//! every 5s ───────────────────▶ heartbeat()      ──▶ system.lastSyncTime
//! report_error(msg) ──────────────────────────────▶ system.errorQueue (≤50)
//! queue_action / drain_actions ───────────────────▶ system.pendingActions
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use escena_core::{SystemErrorEntry, SystemState, MAX_ERROR_QUEUE};
use serde_json::Value;
use tracing::{debug, info};

use crate::store::{Store, WeakStore};
use crate::timer::TimerId;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SystemMonitor {
    store: WeakStore,
    heartbeat: Mutex<Option<TimerId>>,
}

impl SystemMonitor {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.downgrade(),
            heartbeat: Mutex::new(None),
        }
    }

    /// Creates a monitor and starts its heartbeat.
    pub fn start(store: &Store, interval: Duration) -> Arc<Self> {
        let monitor = Arc::new(Self::new(store));
        monitor.start_heartbeat(interval);
        monitor
    }

    pub fn start_heartbeat(self: &Arc<Self>, interval: Duration) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let mut slot = self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            store.clear_interval(previous);
        }
        let weak = Arc::downgrade(self);
        let id = store.register_interval(
            interval,
            Arc::new(move || {
                if let Some(monitor) = weak.upgrade() {
                    monitor.heartbeat();
                }
            }),
        );
        *slot = Some(id);
        debug!(?interval, "Heartbeat started");
    }

    /// Clears the heartbeat interval.
    pub fn stop(&self) {
        let id = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let (Some(id), Some(store)) = (id, self.store.upgrade()) {
            store.clear_interval(id);
            debug!("Heartbeat stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stamps `lastSyncTime`.
    pub fn heartbeat(&self) {
        if let Some(store) = self.store.upgrade() {
            store.modify::<SystemState>(|system| {
                system.last_sync_time = Some(Utc::now());
                true
            });
        }
    }

    /// Records a connectivity change. Returns true if the status flipped.
    pub fn set_online(&self, online: bool) -> bool {
        let Some(store) = self.store.upgrade() else {
            return false;
        };
        let changed = store.modify::<SystemState>(|system| {
            if system.online_status == online {
                return false;
            }
            system.online_status = online;
            true
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Appends to `errorQueue`, dropping the oldest past the cap.
    pub fn report_error(&self, message: impl Into<String>) {
        let entry = SystemErrorEntry {
            message: message.into(),
            timestamp: Utc::now(),
        };
        if let Some(store) = self.store.upgrade() {
            store.modify::<SystemState>(|system| {
                system.error_queue.push(entry);
                let overflow = system.error_queue.len().saturating_sub(MAX_ERROR_QUEUE);
                system.error_queue.drain(..overflow);
                true
            });
        }
    }

    /// Queues work to replay once back online.
    pub fn queue_action(&self, action: Value) {
        if let Some(store) = self.store.upgrade() {
            store.modify::<SystemState>(|system| {
                system.pending_actions.push(action);
                true
            });
        }
    }

    /// Takes every queued action, oldest first.
    pub fn drain_actions(&self) -> Vec<Value> {
        let mut drained = Vec::new();
        if let Some(store) = self.store.upgrade() {
            store.modify::<SystemState>(|system| {
                drained = std::mem::take(&mut system.pending_actions);
                !drained.is_empty()
            });
        }
        drained
    }
}
