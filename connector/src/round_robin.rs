//! Starvation-free selection of the next connection with pending work.
//!
//! [RoundRobin] tracks a pending count per connection id. [RoundRobin::increment] records one
//! unit of work and releases one "work available" permit. [RoundRobin::select] waits for a
//! permit, then scans forward from just after the last id served (wrapping) for the first id
//! with a non-zero count. Because the scan always resumes after the previous winner, an id with
//! pending work is reached within one pass over the other ids.
//!
//! # Example
//!
//! ```rust
//! use sluice_connector::round_robin::RoundRobin;
//! use std::time::Duration;
//!
//! let scheduler = RoundRobin::new(4);
//! for _ in 0..3 {
//!     scheduler.increment(1);
//! }
//! scheduler.increment(3);
//!
//! assert_eq!(scheduler.select(0, Duration::ZERO), Some(1));
//! assert_eq!(scheduler.select(1, Duration::ZERO), Some(3));
//! assert_eq!(scheduler.select(3, Duration::ZERO), Some(1));
//! ```

use sluice_utils::Semaphore;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// Number of full passes a selector makes before handing its permit back.
///
/// Concurrent selectors may race for the same unit; a unit is never lost, only found by a
/// different selector, so a bounded retry is enough.
const PASSES: usize = 2;

/// Pending-work counters with round-robin selection.
#[derive(Debug)]
pub struct RoundRobin {
    pending: Vec<AtomicUsize>,
    work: Semaphore,
}

impl RoundRobin {
    /// Track `connections` ids, all initially idle.
    ///
    /// # Panics
    ///
    /// Panics if `connections` is zero.
    pub fn new(connections: usize) -> Self {
        assert!(connections > 0, "at least one connection is required");
        let mut pending = Vec::with_capacity(connections);
        pending.resize_with(connections, || AtomicUsize::new(0));
        Self {
            pending,
            work: Semaphore::new(0),
        }
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if no ids are tracked (never, by construction).
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Units of work pending for `id`.
    pub fn pending(&self, id: usize) -> usize {
        self.pending[id].load(Ordering::Acquire)
    }

    /// Record one unit of work for `id`.
    pub fn increment(&self, id: usize) {
        // Count first so a woken selector always finds the unit
        self.pending[id].fetch_add(1, Ordering::AcqRel);
        self.work.release();
    }

    /// Claim one unit of work, scanning from the id after `start`.
    ///
    /// Waits at most `timeout` for work to exist. Returns the id whose count was decremented,
    /// or `None` if no work became available in time.
    pub fn select(&self, start: usize, timeout: Duration) -> Option<usize> {
        if !self.work.acquire(timeout) {
            return None;
        }
        let n = self.pending.len();
        for _ in 0..PASSES {
            for offset in 1..=n {
                let id = (start + offset) % n;
                if self.take(id) {
                    return Some(id);
                }
            }
        }

        // Lost every race: leave the unit for whoever holds the matching permit
        self.work.release();
        None
    }

    fn take(&self, id: usize) -> bool {
        self.pending[id]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .is_ok()
    }
}
