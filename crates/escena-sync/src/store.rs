//! # State Store
//!
//! The canonical state tree and the only way to change it.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Store Write Path                                │
//! │                                                                         │
//! │  set::<UiState>(patch) ──┐                                              │
//! │  set_json("ui", {...}) ──┼──▶ lock ─▶ apply patch ─▶ mark dirty ─▶ unlock
//! │  set_batch([...]) ───────┘                              │               │
//! │                                                         ▼               │
//! │                                        first dirty mark arms a timer   │
//! │                                                         │               │
//! │                                   (batch delay) ────────┘               │
//! │                                         ▼                               │
//! │  flush(): lock ─▶ take dirty ─▶ (old, new) per slice ─▶ unlock         │
//! │                                         ▼                               │
//! │                         SubscriptionRegistry::dispatch                  │
//! │                         (persistence, mirror, consumers)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//! The core lock is held only while a patch is applied or a snapshot is
//! taken. Updater closures and listeners run unlocked, so they may call back
//! into the store.
//!
//! ## Lifecycle
//! Defaults → restored persisted slices → migrated legacy keys → running.
//! [`Store::destroy`] cancels every timer and drops every listener without a
//! final flush. Writes after destroy still land in memory.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use escena_core::{GlobalState, Slice, SliceKey, SlicePatch, SliceState};
use escena_storage::{FileBackend, MemoryBackend, StorageBackend};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::{StorageStrategy, StoreConfig};
use crate::debug::DebugHandle;
use crate::error::{StoreError, StoreResult};
use crate::legacy::{LegacyBridge, LegacyMirror, MigrationReport};
use crate::monitor::SystemMonitor;
use crate::persistence::PersistenceCoordinator;
use crate::registry::{
    DispatchReport, ListenerResult, SliceChange, Subscription, SubscriptionRegistry,
};
use crate::scheduler::BatchScheduler;
use crate::timer::{TimerHost, TimerId, TimerTask, TokioTimers};

// =============================================================================
// Host
// =============================================================================

/// Host facilities the store runs on.
#[derive(Debug, Clone)]
pub struct Host {
    pub storage: Arc<dyn StorageBackend>,
    pub timers: Arc<dyn TimerHost>,
}

impl Host {
    pub fn new(storage: Arc<dyn StorageBackend>, timers: Arc<dyn TimerHost>) -> Self {
        Self { storage, timers }
    }

    /// Resolves storage from the configured strategy and timers from the
    /// current tokio runtime.
    ///
    /// A durable medium that cannot be opened degrades to memory.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let storage: Arc<dyn StorageBackend> = match config.strategy {
            StorageStrategy::Session => Arc::new(MemoryBackend::new()),
            StorageStrategy::Durable => {
                let opened = match &config.storage_dir {
                    Some(dir) => FileBackend::open(dir),
                    None => FileBackend::open_default(),
                };
                match opened {
                    Ok(backend) => Arc::new(backend),
                    Err(e) => {
                        warn!(error = %e, "Durable storage unavailable, persisting to memory");
                        Arc::new(MemoryBackend::new())
                    }
                }
            }
        };
        let timers = Arc::new(TokioTimers::current()?);
        Ok(Self::new(storage, timers))
    }
}

// =============================================================================
// Store
// =============================================================================

struct StoreCore {
    state: GlobalState,
    /// What listeners last saw, per slice.
    last_flushed: GlobalState,
    scheduler: BatchScheduler,
}

pub(crate) struct StoreInner {
    config: StoreConfig,
    core: Mutex<StoreCore>,
    registry: Arc<SubscriptionRegistry>,
    host: Host,
    persistence: Arc<PersistenceCoordinator>,
    monitor: OnceLock<Arc<SystemMonitor>>,
    mirror: Mutex<Option<LegacyMirror>>,
    owned_timers: Mutex<Vec<TimerId>>,
    destroyed: AtomicBool,
    /// Held from taking a batch until its dispatch ends, so flushes on
    /// different threads deliver in the order they took their batches.
    flush_gate: Mutex<()>,
    flushing_on: Mutex<Option<ThreadId>>,
}

/// Marks the thread currently dispatching a flush.
struct FlushOwner<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> FlushOwner<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>, id: ThreadId) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        Self { slot }
    }
}

impl Drop for FlushOwner<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = core.scheduler.disarm() {
            self.host.timers.clear(id);
        }
        let owned = self
            .owned_timers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for id in owned.drain(..) {
            self.host.timers.clear(id);
        }
    }
}

/// Shared handle to the state tree. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Non-owning handle, held by timer callbacks and background helpers.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.lock();
        f.debug_struct("Store")
            .field("app_prefix", &self.inner.config.app_prefix)
            .field("pending", &core.scheduler.slot())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Store {
    /// Builds an isolated store.
    ///
    /// ## Startup Order
    /// 1. Validate config
    /// 2. Defaults, overlaid with restored persisted slices
    /// 3. Persistence listeners
    /// 4. Legacy migration (when enabled), then the legacy mirror
    /// 5. Heartbeat and persistence intervals
    pub fn create(config: StoreConfig, host: Host) -> StoreResult<Store> {
        config.validate()?;

        let persistence = Arc::new(PersistenceCoordinator::new(
            &config.app_prefix,
            config.persist.clone(),
            Arc::clone(&host.storage),
        ));

        let mut state = GlobalState::default();
        let restored = persistence.restore(&mut state);

        let store = Store {
            inner: Arc::new(StoreInner {
                core: Mutex::new(StoreCore {
                    last_flushed: state.clone(),
                    state,
                    scheduler: BatchScheduler::new(config.batch_delay()),
                }),
                registry: SubscriptionRegistry::new(),
                host,
                persistence,
                monitor: OnceLock::new(),
                mirror: Mutex::new(None),
                owned_timers: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
                flush_gate: Mutex::new(()),
                flushing_on: Mutex::new(None),
                config,
            }),
        };

        store.inner.persistence.attach(&store);

        let storage = Arc::clone(&store.inner.host.storage);
        let migration = if store.inner.config.migrate_legacy {
            let bridge = LegacyBridge::new(&store.inner.config.app_prefix, Arc::clone(&storage));
            let report = bridge.run(&store);
            debug!(?report, "Legacy migration finished");
            report
        } else {
            MigrationReport::default()
        };
        if store.inner.config.legacy_mirror {
            *store.inner.mirror.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(LegacyMirror::attach(&store, storage, &migration));
        }

        let monitor = SystemMonitor::start(&store, store.inner.config.heartbeat_interval());
        let _ = store.inner.monitor.set(monitor);

        let weak = store.downgrade();
        store.register_interval(
            store.inner.config.persist_interval(),
            Arc::new(move || {
                if let Some(store) = weak.upgrade() {
                    store.persist_now();
                }
            }),
        );

        info!(
            app_prefix = %store.inner.config.app_prefix,
            persisted = ?store.inner.config.persist,
            restored,
            "Store created"
        );
        Ok(store)
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True when both handles point at the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> MutexGuard<'_, StoreCore> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.inner.host.storage
    }

    pub fn timers(&self) -> &Arc<dyn TimerHost> {
        &self.inner.host.timers
    }

    pub(crate) fn persistence(&self) -> &Arc<PersistenceCoordinator> {
        &self.inner.persistence
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Clone of the whole tree.
    pub fn snapshot(&self) -> GlobalState {
        self.lock().state.clone()
    }

    /// Clone of one slice, typed.
    pub fn slice<S: Slice>(&self) -> S {
        S::select(&self.lock().state).clone()
    }

    /// Clone of one slice by name.
    pub fn get(&self, key: &str) -> StoreResult<SliceState> {
        let key: SliceKey = key.parse()?;
        Ok(self.lock().state.slice(key))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Merges a partial update into a slice. Listeners run on the next flush.
    pub fn set<S: Slice>(&self, patch: S::Patch) {
        self.apply_patches(std::iter::once(patch.into()));
    }

    /// String-keyed `set`. The partial is checked against the slice schema.
    pub fn set_json(&self, key: &str, partial: Value) -> StoreResult<()> {
        let key: SliceKey = key.parse()?;
        let patch = SlicePatch::from_json(key, partial)?;
        self.apply_patches(std::iter::once(patch));
        Ok(())
    }

    pub fn set_patch(&self, patch: SlicePatch) {
        self.apply_patches(std::iter::once(patch));
    }

    /// Computes a patch from the current slice, then applies it.
    ///
    /// The closure runs without the store locked.
    pub fn update<S: Slice>(&self, f: impl FnOnce(&S) -> S::Patch) {
        let current = self.slice::<S>();
        let patch = f(&current);
        self.set::<S>(patch);
    }

    /// Like [`update`](Self::update); an `Err` leaves the slice untouched.
    pub fn try_update<S: Slice, E>(
        &self,
        f: impl FnOnce(&S) -> Result<S::Patch, E>,
    ) -> Result<(), E> {
        let current = self.slice::<S>();
        let patch = f(&current)?;
        self.set::<S>(patch);
        Ok(())
    }

    /// Applies every patch in one turn; they share a single flush.
    pub fn set_batch(&self, patches: impl IntoIterator<Item = SlicePatch>) {
        self.apply_patches(patches);
    }

    /// String-keyed `set_batch`. Nothing is applied unless every entry parses.
    pub fn set_batch_json(&self, entries: Map<String, Value>) -> StoreResult<()> {
        let patches = entries
            .into_iter()
            .map(|(key, partial)| {
                let key: SliceKey = key.parse()?;
                Ok(SlicePatch::from_json(key, partial)?)
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.apply_patches(patches);
        Ok(())
    }

    /// Edits a slice in place under the lock. Marks it dirty only when `f`
    /// returns true.
    pub(crate) fn modify<S: Slice>(&self, f: impl FnOnce(&mut S) -> bool) -> bool {
        let arm = {
            let mut core = self.lock();
            if !f(S::select_mut(&mut core.state)) {
                return false;
            }
            self.mark_dirty(&mut core, S::KEY)
        };
        if arm {
            self.arm_flush();
        }
        true
    }

    fn apply_patches(&self, patches: impl IntoIterator<Item = SlicePatch>) {
        let arm = {
            let mut core = self.lock();
            let mut arm = false;
            for patch in patches {
                let key = patch.key();
                patch.apply_to(&mut core.state);
                arm |= self.mark_dirty(&mut core, key);
            }
            arm
        };
        if arm {
            self.arm_flush();
        }
    }

    fn mark_dirty(&self, core: &mut StoreCore, key: SliceKey) -> bool {
        let needs_timer = core.scheduler.mark_dirty(key);
        if needs_timer && self.is_destroyed() {
            core.scheduler.disarm();
            return false;
        }
        needs_timer
    }

    fn arm_flush(&self) {
        let weak = self.downgrade();
        let id = self.inner.host.timers.set_timeout(
            self.inner.config.batch_delay(),
            Arc::new(move || {
                if let Some(store) = weak.upgrade() {
                    store.flush();
                }
            }),
        );
        self.lock().scheduler.attach_timer(id);
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Notifies listeners of every slice changed since the last flush.
    ///
    /// Runs on the batch timer; call it directly for a synchronous tick.
    ///
    /// Flushes are serialized: a flush waits for one in progress on another
    /// thread. A flush requested by a listener during dispatch returns an
    /// empty report; its slices stay dirty for the next tick.
    pub fn flush(&self) -> DispatchReport {
        let current = thread::current().id();
        if *self
            .inner
            .flushing_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(current)
        {
            debug!("Flush requested during dispatch, deferred");
            return DispatchReport::default();
        }
        let _gate = self
            .inner
            .flush_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _owner = FlushOwner::enter(&self.inner.flushing_on, current);

        let (changes, tree) = {
            let mut core = self.lock();
            let (keys, timer) = core.scheduler.take();
            if let Some(id) = timer {
                self.inner.host.timers.clear(id);
            }
            if keys.is_empty() || self.is_destroyed() {
                return DispatchReport::default();
            }
            let changes: Vec<SliceChange> = keys
                .into_iter()
                .map(|key| SliceChange {
                    key,
                    old: core.last_flushed.slice(key),
                    new: core.state.slice(key),
                })
                .collect();
            for change in &changes {
                core.last_flushed.replace_slice(change.new.clone());
            }
            (changes, core.state.clone())
        };

        let report = self.inner.registry.dispatch(&changes, &tree);
        debug!(
            slices = ?changes.iter().map(|c| c.key).collect::<Vec<_>>(),
            delivered = report.delivered,
            failed = report.failed,
            "Flushed"
        );
        report
    }

    /// Slices written since the last flush.
    pub fn pending(&self) -> Vec<SliceKey> {
        self.lock().scheduler.dirty().collect()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Typed slice listener, called with `(new, old)`.
    pub fn subscribe<S, F>(&self, listener: F) -> Subscription
    where
        S: Slice,
        F: Fn(&S, &S) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.registry.add_slice(
            S::KEY,
            Arc::new(move |change: &SliceChange| {
                match (S::from_state(&change.new), S::from_state(&change.old)) {
                    (Some(new), Some(old)) => listener(new, old),
                    _ => Ok(()),
                }
            }),
        )
    }

    pub fn subscribe_slice<F>(&self, key: SliceKey, listener: F) -> Subscription
    where
        F: Fn(&SliceChange) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.registry.add_slice(key, Arc::new(listener))
    }

    /// String-keyed slice listener. Use [`subscribe_all`](Self::subscribe_all)
    /// for `"*"`.
    pub fn subscribe_key<F>(&self, key: &str, listener: F) -> StoreResult<Subscription>
    where
        F: Fn(&SliceChange) -> ListenerResult + Send + Sync + 'static,
    {
        if key == "*" {
            return Err(StoreError::InvalidSlice(
                "'*' is not a slice; use subscribe_all".into(),
            ));
        }
        let key: SliceKey = key.parse()?;
        Ok(self.subscribe_slice(key, listener))
    }

    /// Wildcard listener, called once per flush with the whole tree.
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&GlobalState) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.registry.add_wildcard(Arc::new(listener))
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }

    // =========================================================================
    // Timers & Lifecycle
    // =========================================================================

    /// Schedules a repeating task that [`destroy`](Self::destroy) cancels.
    pub fn register_interval(&self, period: Duration, task: TimerTask) -> TimerId {
        let id = self.inner.host.timers.set_interval(period, task);
        self.inner
            .owned_timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        id
    }

    pub fn clear_interval(&self, id: TimerId) {
        self.inner
            .owned_timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|owned| *owned != id);
        self.inner.host.timers.clear(id);
    }

    /// Writes every persisted slice now.
    pub fn persist_now(&self) -> usize {
        let state = self.snapshot();
        self.inner.persistence.persist_all(&state)
    }

    /// Cancels timers and drops listeners. Pending changes are not flushed.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(id) = self.lock().scheduler.disarm() {
            self.inner.host.timers.clear(id);
        }
        let owned: Vec<TimerId> = self
            .inner
            .owned_timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for id in owned {
            self.inner.host.timers.clear(id);
        }
        self.inner.registry.clear();
        info!(app_prefix = %self.inner.config.app_prefix, "Store destroyed");
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    pub fn system_monitor(&self) -> Option<Arc<SystemMonitor>> {
        self.inner.monitor.get().cloned()
    }

    /// Stops writing flat legacy keys; ends the transition window.
    pub fn detach_legacy_mirror(&self) -> bool {
        let mirror = self
            .inner
            .mirror
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match mirror {
            Some(mirror) => {
                mirror.detach();
                true
            }
            None => false,
        }
    }

    /// Re-imports legacy keys written by consumers that have not migrated.
    pub fn import_legacy(&self) -> crate::legacy::MigrationReport {
        LegacyBridge::new(&self.inner.config.app_prefix, Arc::clone(self.storage()))
            .import_pending(self)
    }

    pub fn debug(&self) -> DebugHandle {
        DebugHandle::new(self.clone())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_store, test_store_with};
    use anyhow::anyhow;
    use escena_core::{AuthState, NavigationState, Theme, UiPatch, UiState};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn ui(theme: Theme) -> UiPatch {
        UiPatch {
            theme: Some(theme),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_is_visible_immediately_but_notifies_later() {
        let (store, _storage, timers) = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe::<UiState, _>(move |_new, _old| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.set::<UiState>(ui(Theme::Dark));
        assert_eq!(store.slice::<UiState>().theme, Theme::Dark);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        timers.advance(Duration::from_millis(16));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_coalescing_delivers_net_change_once() {
        let (store, _storage, timers) = test_store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        store.subscribe::<UiState, _>(move |new, old| {
            s.lock().unwrap().push((old.theme, new.theme, new.sidebar_collapsed));
            Ok(())
        });

        store.set::<UiState>(ui(Theme::Dark));
        store.set::<UiState>(ui(Theme::Auto));
        store.set::<UiState>(UiPatch {
            sidebar_collapsed: Some(true),
            ..Default::default()
        });
        timers.advance(Duration::from_millis(16));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Theme::Light, Theme::Auto, true)]
        );
    }

    #[test]
    fn test_no_cross_slice_leakage() {
        let (store, _storage, timers) = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe::<UiState, _>(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.set_json("auth", json!({"isAuthenticated": true})).unwrap();
        timers.advance(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_slice_rejected() {
        let (store, _storage, _timers) = test_store();
        assert!(matches!(
            store.set_json("profile", json!({})),
            Err(StoreError::InvalidSlice(_))
        ));
        assert!(matches!(store.get("profile"), Err(StoreError::InvalidSlice(_))));
        assert!(store.subscribe_key("profile", |_| Ok(())).is_err());
        assert!(store.subscribe_key("*", |_| Ok(())).is_err());
    }

    #[test]
    fn test_set_batch_json_is_all_or_nothing() {
        let (store, _storage, _timers) = test_store();
        let mut entries = Map::new();
        entries.insert("ui".into(), json!({"theme": "dark"}));
        entries.insert("navigation".into(), json!({"currentRoute": 5}));

        assert!(store.set_batch_json(entries).is_err());
        assert_eq!(store.slice::<UiState>().theme, Theme::Light);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_set_batch_single_flush() {
        let (store, _storage, timers) = test_store();
        let wildcard = Arc::new(AtomicUsize::new(0));
        let w = Arc::clone(&wildcard);
        store.subscribe_all(move |_| {
            w.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut entries = Map::new();
        entries.insert("ui".into(), json!({"theme": "dark"}));
        entries.insert("navigation".into(), json!({"currentRoute": "/clubs"}));
        store.set_batch_json(entries).unwrap();
        assert_eq!(store.pending(), vec![SliceKey::Ui, SliceKey::Navigation]);

        timers.advance(Duration::from_millis(16));
        assert_eq!(wildcard.load(Ordering::SeqCst), 1);
        assert_eq!(store.slice::<NavigationState>().current_route, "/clubs");
    }

    #[test]
    fn test_noop_set_still_notifies() {
        let (store, _storage, _timers) = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe_slice(SliceKey::Ui, move |change| {
            assert!(change.is_noop());
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.set::<UiState>(UiPatch::default());
        store.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_failure_isolation() {
        let (store, _storage, _timers) = test_store();
        let second = Arc::new(AtomicUsize::new(0));
        store.subscribe::<UiState, _>(|_, _| Err(anyhow!("listener A broke")));
        let s = Arc::clone(&second);
        store.subscribe::<UiState, _>(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.set::<UiState>(ui(Theme::Dark));
        let report = store.flush();
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(report.failed >= 1);
    }

    #[test]
    fn test_updater_and_fallible_updater() {
        let (store, _storage, _timers) = test_store();
        store.update::<UiState>(|ui| UiPatch {
            sidebar_collapsed: Some(!ui.sidebar_collapsed),
            ..Default::default()
        });
        assert!(store.slice::<UiState>().sidebar_collapsed);
        store.flush();

        let result: Result<(), &str> = store.try_update::<UiState, _>(|_| Err("nope"));
        assert_eq!(result, Err("nope"));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_listener_can_write_back() {
        let (store, _storage, timers) = test_store();
        let writer = store.clone();
        store.subscribe::<AuthState, _>(move |new, _| {
            if new.is_authenticated {
                writer.set::<UiState>(ui(Theme::Dark));
            }
            Ok(())
        });

        store.set_json("auth", json!({"isAuthenticated": true})).unwrap();
        timers.advance(Duration::from_millis(16));
        assert_eq!(store.pending(), vec![SliceKey::Ui]);
        timers.advance(Duration::from_millis(16));
        assert!(store.pending().is_empty());
        assert_eq!(store.slice::<UiState>().theme, Theme::Dark);
    }

    #[test]
    fn test_destroy_cancels_timers_without_flush() {
        let (store, _storage, timers) = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        store.subscribe::<UiState, _>(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        store.set::<UiState>(ui(Theme::Dark));
        assert!(timers.active_timers() >= 3);
        store.destroy();
        assert_eq!(timers.active_timers(), 0);

        timers.advance(Duration::from_secs(60));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.set::<UiState>(ui(Theme::Auto));
        assert_eq!(store.slice::<UiState>().theme, Theme::Auto);
        assert_eq!(timers.active_timers(), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let (store, _storage, _timers) = test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let sub = store.subscribe::<UiState, _>(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());

        store.set::<UiState>(ui(Theme::Dark));
        store.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_flushes_deliver_in_order() {
        use std::sync::mpsc;

        let (store, _storage, _timers) = test_store();
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let first_call = AtomicBool::new(true);
        store.subscribe::<UiState, _>(move |_, _| {
            if first_call.swap(false, Ordering::SeqCst) {
                entered_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
            Ok(())
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        store.subscribe::<UiState, _>(move |new, _| {
            s.lock().unwrap().push(new.theme);
            Ok(())
        });

        store.set::<UiState>(ui(Theme::Dark));
        let first = {
            let store = store.clone();
            std::thread::spawn(move || store.flush())
        };
        entered_rx.recv().unwrap();

        store.set::<UiState>(ui(Theme::Auto));
        let second = {
            let store = store.clone();
            std::thread::spawn(move || store.flush())
        };
        std::thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Theme::Dark, Theme::Auto]);
        assert_eq!(store.slice::<UiState>().theme, Theme::Auto);
    }

    #[test]
    fn test_flush_from_listener_is_deferred() {
        let (store, _storage, timers) = test_store();
        let inner = store.clone();
        let nested = Arc::new(Mutex::new(None));
        let n = Arc::clone(&nested);
        store.subscribe::<UiState, _>(move |new, _| {
            if new.theme == Theme::Dark {
                inner.set::<UiState>(ui(Theme::Auto));
                *n.lock().unwrap() = Some(inner.flush());
            }
            Ok(())
        });

        store.set::<UiState>(ui(Theme::Dark));
        store.flush();
        assert_eq!(*nested.lock().unwrap(), Some(DispatchReport::default()));
        assert_eq!(store.pending(), vec![SliceKey::Ui]);

        timers.advance(Duration::from_millis(16));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = test_store_with(StoreConfig::default().app_prefix(""));
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
