//! Track how much of a timeout budget remains across several bounded waits.

use std::time::{Duration, Instant};

/// A timeout budget shared by a sequence of bounded waits.
///
/// Operations that acquire several resources in a row (a lock, then a local permit, then a
/// global permit) must not wait longer than the caller's timeout in total. Each step asks the
/// [Deadline] for the [remaining](Deadline::remaining) budget and waits at most that long.
///
/// The remaining budget is always clamped to `[0, timeout]`, even if the clock misbehaves.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Start a budget of `timeout` beginning now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
        }
    }

    /// Time left before the budget is exhausted.
    pub fn remaining(&self) -> Duration {
        // `Instant::elapsed` saturates to zero rather than going negative.
        self.timeout
            .saturating_sub(self.start.elapsed())
            .min(self.timeout)
    }
}
