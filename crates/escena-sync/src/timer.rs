//! # Timer Host
//!
//! The host facility behind every deferred action in the engine.
//!
//! ## Timer Users
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Timer Users                                     │
//! │                                                                         │
//! │  BatchScheduler ───── set_timeout(16ms)  one pending flush at a time   │
//! │  Persistence ──────── set_interval(30s)  safety-net full write         │
//! │  SystemMonitor ────── set_interval(5s)   heartbeat                     │
//! │                                                                         │
//! │  destroy() ────────── clear() on all of the above                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Implementations
//! - [`TokioTimers`] - spawns sleep/interval tasks on the current runtime
//! - [`ManualTimers`] - virtual clock driven by [`ManualTimers::advance`]

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::error::{StoreError, StoreResult};

/// Handle returned by `set_timeout`/`set_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Callback run when a timer fires.
pub type TimerTask = Arc<dyn Fn() + Send + Sync>;

/// Minimum period for repeating timers.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Schedules callbacks on the host's event loop.
pub trait TimerHost: Send + Sync + fmt::Debug {
    /// Runs `task` once after `delay`.
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Runs `task` every `period`, first after one full period.
    fn set_interval(&self, period: Duration, task: TimerTask) -> TimerId;

    /// Cancels a timer. Unknown or already-fired ids are ignored.
    fn clear(&self, id: TimerId);

    /// Number of timers still scheduled.
    fn active_timers(&self) -> usize;
}

// =============================================================================
// Tokio Timers
// =============================================================================

/// Timers backed by tokio tasks on a runtime handle.
#[derive(Clone)]
pub struct TokioTimers {
    handle: Handle,
    next_id: Arc<AtomicU64>,
    tasks: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl fmt::Debug for TokioTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTimers")
            .field("active", &self.active_timers())
            .finish()
    }
}

impl TokioTimers {
    /// Binds to the runtime the caller is running on.
    pub fn current() -> StoreResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| StoreError::TimerUnavailable(format!("no tokio runtime: {}", e)))?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: Arc::new(AtomicU64::new(1)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TimerId, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl TimerHost for TokioTimers {
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = self.allocate();
        let tasks = Arc::clone(&self.tasks);

        // Held across spawn so the task cannot deregister before it is registered.
        let mut guard = self.lock();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
            tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        });
        guard.insert(id, join);
        trace!(%id, ?delay, "Timeout scheduled");
        id
    }

    fn set_interval(&self, period: Duration, task: TimerTask) -> TimerId {
        let id = self.allocate();
        let period = period.max(MIN_PERIOD);

        let join = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });
        self.lock().insert(id, join);
        trace!(%id, ?period, "Interval scheduled");
        id
    }

    fn clear(&self, id: TimerId) {
        if let Some(join) = self.lock().remove(&id) {
            join.abort();
            trace!(%id, "Timer cleared");
        }
    }

    fn active_timers(&self) -> usize {
        self.lock().len()
    }
}

// =============================================================================
// Manual Timers
// =============================================================================

struct ManualTimer {
    due: Duration,
    period: Option<Duration>,
    task: TimerTask,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, ManualTimer>,
}

/// Deterministic virtual clock. Nothing fires until [`advance`](Self::advance).
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
/// use escena_sync::timer::{ManualTimers, TimerHost};
///
/// let timers = ManualTimers::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let h = hits.clone();
/// timers.set_interval(Duration::from_secs(5), Arc::new(move || {
///     h.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// timers.advance(Duration::from_secs(12));
/// assert_eq!(hits.load(Ordering::SeqCst), 2);
/// ```
#[derive(Clone, Default)]
pub struct ManualTimers {
    clock: Arc<Mutex<ManualClock>>,
}

impl fmt::Debug for ManualTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.lock();
        f.debug_struct("ManualTimers")
            .field("now", &clock.now)
            .field("active", &clock.timers.len())
            .finish()
    }
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Moves the clock forward, firing due timers in deadline order.
    ///
    /// Callbacks run without the clock locked, so they may schedule or clear
    /// timers; anything they schedule inside the window also fires.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        loop {
            let task = {
                let mut clock = self.lock();
                let next = clock
                    .timers
                    .iter()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(id, t)| (t.due, **id))
                    .map(|(id, _)| *id);

                let Some(id) = next else {
                    clock.now = target;
                    break;
                };

                let (due, period) = match clock.timers.get(&id) {
                    Some(t) => (t.due, t.period),
                    None => break,
                };
                clock.now = due;
                match period {
                    Some(p) => match clock.timers.get_mut(&id) {
                        Some(t) => {
                            t.due = due + p;
                            Arc::clone(&t.task)
                        }
                        None => break,
                    },
                    None => match clock.timers.remove(&id) {
                        Some(t) => t.task,
                        None => break,
                    },
                }
            };
            task();
        }
    }

    /// Fires everything due right now.
    pub fn run_pending(&self) {
        self.advance(Duration::ZERO);
    }

    fn schedule(&self, delay: Duration, period: Option<Duration>, task: TimerTask) -> TimerId {
        let mut clock = self.lock();
        clock.next_id += 1;
        let id = TimerId(clock.next_id);
        let due = clock.now + delay;
        clock.timers.insert(id, ManualTimer { due, period, task });
        id
    }
}

impl TimerHost for ManualTimers {
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId {
        self.schedule(delay, None, task)
    }

    fn set_interval(&self, period: Duration, task: TimerTask) -> TimerId {
        let period = period.max(MIN_PERIOD);
        self.schedule(period, Some(period), task)
    }

    fn clear(&self, id: TimerId) {
        self.lock().timers.remove(&id);
    }

    fn active_timers(&self) -> usize {
        self.lock().timers.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
