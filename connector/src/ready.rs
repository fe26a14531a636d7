//! Cross-connection notification of committed payloads.

use crate::{round_robin::RoundRobin, Schedule};
use crossbeam_queue::SegQueue;
use sluice_utils::Semaphore;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// Tracks which connections hold payloads awaiting a consumer.
///
/// Every commit publishes its connection id exactly once; every successful [Ready::next]
/// consumes one publication.
#[derive(Debug)]
pub(crate) enum Ready {
    /// Ids are handed out in commit order.
    Fifo { ids: SegQueue<usize>, work: Semaphore },
    /// Ids are handed out round-robin, resuming after the last id served.
    RoundRobin {
        scheduler: RoundRobin,
        last: AtomicUsize,
    },
}

impl Ready {
    pub(crate) fn new(schedule: Schedule, connections: usize) -> Self {
        match schedule {
            Schedule::Fifo => Self::Fifo {
                ids: SegQueue::new(),
                work: Semaphore::new(0),
            },
            Schedule::RoundRobin => Self::RoundRobin {
                scheduler: RoundRobin::new(connections),
                // The first scan starts at id 0
                last: AtomicUsize::new(connections - 1),
            },
        }
    }

    /// Publish one committed payload on connection `id`.
    pub(crate) fn notify(&self, id: usize) {
        match self {
            Self::Fifo { ids, work } => {
                ids.push(id);
                work.release();
            }
            Self::RoundRobin { scheduler, .. } => scheduler.increment(id),
        }
    }

    /// Wait at most `timeout` for a published id.
    pub(crate) fn next(&self, timeout: Duration) -> Option<usize> {
        match self {
            Self::Fifo { ids, work } => {
                if !work.acquire(timeout) {
                    return None;
                }

                // A permit is released only after its id is pushed
                Some(ids.pop().expect("ready permit without a published id"))
            }
            Self::RoundRobin { scheduler, last } => {
                let id = scheduler.select(last.load(Ordering::Acquire), timeout)?;
                last.store(id, Ordering::Release);
                Some(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_preserves_commit_order() {
        let ready = Ready::new(Schedule::Fifo, 3);
        for id in [2, 0, 2, 1] {
            ready.notify(id);
        }
        let order: Vec<_> = std::iter::from_fn(|| ready.next(Duration::ZERO)).collect();
        assert_eq!(order, vec![2, 0, 2, 1]);
    }

    #[test]
    fn test_round_robin_alternates() {
        let ready = Ready::new(Schedule::RoundRobin, 3);
        for id in [2, 2, 2, 0] {
            ready.notify(id);
        }
        let order: Vec<_> = std::iter::from_fn(|| ready.next(Duration::ZERO)).collect();
        assert_eq!(order, vec![0, 2, 2, 2]);
    }
}
