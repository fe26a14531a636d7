//! A counting permit pool with bounded waits.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A counting semaphore whose acquisitions never block indefinitely.
///
/// Permits are plain counts: any holder may [release](Semaphore::release) a permit acquired by
/// another thread. This lets a producer reserve capacity that a consumer later gives back.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `permits` permits.
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Take a permit if one is immediately available.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Take a permit, waiting at most `timeout` for one to become available.
    ///
    /// A zero `timeout` never blocks.
    pub fn acquire(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.try_acquire();
        }
        let deadline = Instant::now().checked_add(timeout);
        let mut permits = self.permits.lock();
        while *permits == 0 {
            match deadline {
                Some(deadline) => {
                    if self
                        .available
                        .wait_until(&mut permits, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.available.wait(&mut permits),
            }
        }
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Return one permit to the pool, waking one waiter.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }

    /// Permits currently available.
    ///
    /// The value may be stale as soon as it is returned.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
