//! # Batch Scheduler
//!
//! Coalesces writes into one notification pass per tick.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Batch Scheduler                                 │
//! │                                                                         │
//! │  set(ui) ──┐                                                            │
//! │  set(ui) ──┼──▶ dirty {ui, auth} ──▶ one timer (16ms) ──▶ flush()     │
//! │  set(auth)─┘        │                                        │          │
//! │                     │                                        ▼          │
//! │                     │                        ui listeners  (once, net) │
//! │                     │                        auth listeners (once, net)│
//! │                     │                        "*" listeners (once, tree)│
//! │                     ▼                                                   │
//! │  slot: Idle ──mark_dirty──▶ Arming ──attach_timer──▶ Armed ──take──▶ Idle
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler is bookkeeping only. The store owns the timer host and the
//! listener dispatch.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use escena_core::SliceKey;

use crate::timer::TimerId;

/// Default coalescing window (one animation frame).
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(16);

/// State of the single pending flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushSlot {
    /// Nothing pending.
    Idle,
    /// A flush is owed; the timer is being requested.
    Arming,
    /// A timer is scheduled.
    Armed(TimerId),
}

impl fmt::Display for FlushSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushSlot::Idle => write!(f, "idle"),
            FlushSlot::Arming => write!(f, "arming"),
            FlushSlot::Armed(id) => write!(f, "armed({})", id),
        }
    }
}

#[derive(Debug)]
pub struct BatchScheduler {
    delay: Duration,
    dirty: BTreeSet<SliceKey>,
    slot: FlushSlot,
}

impl BatchScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            dirty: BTreeSet::new(),
            slot: FlushSlot::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn slot(&self) -> FlushSlot {
        self.slot
    }

    /// Records a dirty slice. Returns true when the caller must arm a timer.
    pub fn mark_dirty(&mut self, key: SliceKey) -> bool {
        self.dirty.insert(key);
        if self.slot == FlushSlot::Idle {
            self.slot = FlushSlot::Arming;
            true
        } else {
            false
        }
    }

    /// Records the timer armed after `mark_dirty` returned true.
    ///
    /// Ignored if a flush already ran in between.
    pub fn attach_timer(&mut self, id: TimerId) {
        if self.slot == FlushSlot::Arming {
            self.slot = FlushSlot::Armed(id);
        }
    }

    /// Gives up arming (no timer host available, store destroyed).
    pub fn disarm(&mut self) -> Option<TimerId> {
        let previous = std::mem::replace(&mut self.slot, FlushSlot::Idle);
        match previous {
            FlushSlot::Armed(id) => Some(id),
            _ => None,
        }
    }

    /// Drains the dirty set for a flush and resets the slot.
    ///
    /// Returns the armed timer, if any, so the caller can clear it.
    pub fn take(&mut self) -> (Vec<SliceKey>, Option<TimerId>) {
        let keys = std::mem::take(&mut self.dirty).into_iter().collect();
        (keys, self.disarm())
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty(&self) -> impl Iterator<Item = SliceKey> + '_ {
        self.dirty.iter().copied()
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arms_once_per_batch() {
        let mut scheduler = BatchScheduler::default();
        assert!(scheduler.mark_dirty(SliceKey::Ui));
        scheduler.attach_timer(TimerId(7));
        assert!(!scheduler.mark_dirty(SliceKey::Ui));
        assert!(!scheduler.mark_dirty(SliceKey::Auth));
        assert_eq!(scheduler.slot(), FlushSlot::Armed(TimerId(7)));

        let (keys, timer) = scheduler.take();
        assert_eq!(keys, vec![SliceKey::Auth, SliceKey::Ui]);
        assert_eq!(timer, Some(TimerId(7)));
        assert_eq!(scheduler.slot(), FlushSlot::Idle);
        assert!(!scheduler.is_dirty());

        assert!(scheduler.mark_dirty(SliceKey::System));
    }

    #[test]
    fn test_late_attach_ignored() {
        let mut scheduler = BatchScheduler::default();
        assert!(scheduler.mark_dirty(SliceKey::Ui));
        let (keys, timer) = scheduler.take();
        assert_eq!(keys, vec![SliceKey::Ui]);
        assert_eq!(timer, None);

        scheduler.attach_timer(TimerId(1));
        assert_eq!(scheduler.slot(), FlushSlot::Idle);
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(FlushSlot::Armed(TimerId(3)).to_string(), "armed(timer#3)");
        assert_eq!(FlushSlot::Idle.to_string(), "idle");
    }
}
