//! # Subscription Registry
//!
//! Per-slice listener lists plus one wildcard list.
//!
//! ## Dispatch Order (one flush)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Dispatch                                        │
//! │                                                                         │
//! │  for each dirty slice:                                                 │
//! │      listeners[slice] in subscription order  ← (old, new) net change    │
//! │  then once:                                                             │
//! │      wildcard listeners in subscription order ← whole tree              │
//! │                                                                         │
//! │  A listener returning Err is logged; the rest still run.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners are called on a snapshot of the lists taken before the pass,
//! with no lock held. A listener may subscribe, unsubscribe or write to the
//! store; changes to the lists take effect on the next flush.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use escena_core::{GlobalState, SliceKey, SliceState};
use tracing::{error, trace};

use crate::error::StoreError;

/// What a listener returns. `Err` is logged and does not stop dispatch.
pub type ListenerResult = anyhow::Result<()>;

pub type SliceListener = Arc<dyn Fn(&SliceChange) -> ListenerResult + Send + Sync>;
pub type WildcardListener = Arc<dyn Fn(&GlobalState) -> ListenerResult + Send + Sync>;

/// Net change of one slice since the previous flush.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceChange {
    pub key: SliceKey,
    pub old: SliceState,
    pub new: SliceState,
}

impl SliceChange {
    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Which list a subscription lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTarget {
    Slice(SliceKey),
    Wildcard,
}

impl fmt::Display for ListenerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerTarget::Slice(key) => write!(f, "{}", key),
            ListenerTarget::Wildcard => write!(f, "*"),
        }
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_slice: BTreeMap<SliceKey, Vec<(ListenerId, SliceListener)>>,
    wildcard: Vec<(ListenerId, WildcardListener)>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    listeners: Mutex<Listeners>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("slices", &listeners.by_slice.keys().collect::<Vec<_>>())
            .field("wildcard", &listeners.wildcard.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_slice(self: &Arc<Self>, key: SliceKey, listener: SliceListener) -> Subscription {
        let id = {
            let mut listeners = self.lock();
            listeners.next_id += 1;
            let id = ListenerId(listeners.next_id);
            listeners.by_slice.entry(key).or_default().push((id, listener));
            id
        };
        trace!(slice = %key, ?id, "Listener added");
        Subscription::new(self, ListenerTarget::Slice(key), id)
    }

    pub fn add_wildcard(self: &Arc<Self>, listener: WildcardListener) -> Subscription {
        let id = {
            let mut listeners = self.lock();
            listeners.next_id += 1;
            let id = ListenerId(listeners.next_id);
            listeners.wildcard.push((id, listener));
            id
        };
        trace!(?id, "Wildcard listener added");
        Subscription::new(self, ListenerTarget::Wildcard, id)
    }

    /// Removes a listener and prunes an emptied slice entry.
    fn remove(&self, target: ListenerTarget, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        match target {
            ListenerTarget::Slice(key) => {
                let Some(list) = listeners.by_slice.get_mut(&key) else {
                    return false;
                };
                let before = list.len();
                list.retain(|(lid, _)| *lid != id);
                let removed = list.len() != before;
                if list.is_empty() {
                    listeners.by_slice.remove(&key);
                }
                removed
            }
            ListenerTarget::Wildcard => {
                let before = listeners.wildcard.len();
                listeners.wildcard.retain(|(lid, _)| *lid != id);
                listeners.wildcard.len() != before
            }
        }
    }

    pub fn listener_count(&self, target: ListenerTarget) -> usize {
        let listeners = self.lock();
        match target {
            ListenerTarget::Slice(key) => listeners.by_slice.get(&key).map_or(0, Vec::len),
            ListenerTarget::Wildcard => listeners.wildcard.len(),
        }
    }

    /// Slices that currently have at least one listener.
    pub fn subscribed_slices(&self) -> Vec<SliceKey> {
        self.lock().by_slice.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut listeners = self.lock();
        listeners.by_slice.clear();
        listeners.wildcard.clear();
    }

    /// Notifies slice listeners for each change, then wildcard listeners once.
    pub fn dispatch(&self, changes: &[SliceChange], tree: &GlobalState) -> DispatchReport {
        let (per_slice, wildcard) = {
            let listeners = self.lock();
            let per_slice: Vec<(&SliceChange, Vec<SliceListener>)> = changes
                .iter()
                .map(|change| {
                    let list = listeners
                        .by_slice
                        .get(&change.key)
                        .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
                        .unwrap_or_default();
                    (change, list)
                })
                .collect();
            let wildcard: Vec<WildcardListener> =
                listeners.wildcard.iter().map(|(_, f)| Arc::clone(f)).collect();
            (per_slice, wildcard)
        };

        let mut report = DispatchReport::default();

        for (change, list) in per_slice {
            for listener in list {
                match listener(change) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        let err = StoreError::ListenerExecution {
                            slice: change.key.to_string(),
                            reason: format!("{:#}", e),
                        };
                        error!(slice = %change.key, error = %err, "Listener failed");
                    }
                }
            }
        }

        if !changes.is_empty() {
            for listener in wildcard {
                match listener(tree) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        let err = StoreError::ListenerExecution {
                            slice: ListenerTarget::Wildcard.to_string(),
                            reason: format!("{:#}", e),
                        };
                        error!(slice = "*", error = %err, "Wildcard listener failed");
                    }
                }
            }
        }

        report
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle returned by every subscribe call.
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it. Unsubscribing twice is
/// harmless.
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    target: ListenerTarget,
    id: ListenerId,
    active: AtomicBool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    fn new(registry: &Arc<SubscriptionRegistry>, target: ListenerTarget, id: ListenerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            target,
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn target(&self) -> ListenerTarget {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.target, self.id),
            None => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
