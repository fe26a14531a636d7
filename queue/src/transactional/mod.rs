//! Queues that reserve capacity before writing.
//!
//! A [TransactionalMultiQueue] holds one [TransactionQueue] per destination. Inserting is a
//! two-phase protocol:
//!
//! 1. [TransactionQueue::begin] acquires the queue's transaction lock (one producer in flight
//!    per queue), then a local permit (the queue's own bound), then a global permit (the bound
//!    shared by every sibling). Each wait is limited to what remains of the caller's timeout.
//!    If any step fails, everything acquired so far is released before returning.
//! 2. [Transaction::commit] writes the value and releases only the transaction lock. The local
//!    and global permits are returned by [TransactionQueue::poll] when the value leaves the
//!    queue. [Transaction::rollback] (or dropping the transaction) returns all three at once.
//!
//! As a result, at every observable instant each queue holds at most its local capacity and
//! the queues together hold at most the global capacity.
//!
//! Values are stored in a single [sluice_storage::slotted::Queue] sized to the global
//! capacity, with one member per transaction queue.
//!
//! # Diagnostics
//!
//! With the `diagnostics` feature enabled, each queue counts begins, commits, and rollbacks,
//! and debug builds assert that `begins == commits + rollbacks` between transactions.
//!
//! # Example
//!
//! ```rust
//! use sluice_queue::transactional::TransactionalMultiQueue;
//! use std::time::Duration;
//!
//! let queues = TransactionalMultiQueue::new(3, &[2, 2]);
//! let (a, b) = (queues.queue(0), queues.queue(1));
//!
//! a.begin(Duration::ZERO).unwrap().commit("a1");
//! a.begin(Duration::ZERO).unwrap().commit("a2");
//!
//! // `a` is at its local capacity
//! assert!(a.begin(Duration::ZERO).is_none());
//!
//! // `b` gets the last global slot
//! b.begin(Duration::ZERO).unwrap().commit("b1");
//! assert!(b.begin(Duration::ZERO).is_none());
//! assert_eq!(queues.len(), 3);
//!
//! // Polling returns capacity to both bounds
//! assert_eq!(a.poll(), Some("a1"));
//! assert!(b.begin(Duration::ZERO).is_some());
//! ```

#[cfg(feature = "diagnostics")]
mod diagnostics;
mod queue;

#[cfg(feature = "diagnostics")]
pub use diagnostics::Counts;
pub use queue::{Transaction, TransactionQueue, TransactionalMultiQueue};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use sluice_macros::test_traced;
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        thread,
        time::{Duration, Instant},
    };

    #[test_traced]
    fn test_fill_timeout_poll_begin() {
        let queues = TransactionalMultiQueue::new(3, &[3]);
        let queue = queues.queue(0);
        queue.begin(Duration::ZERO).unwrap().commit(5);
        queue.begin(Duration::ZERO).unwrap().commit(9);
        queue.begin(Duration::ZERO).unwrap().commit(2);
        assert_eq!(queue.len(), 3);

        // A fourth begin times out and changes nothing
        let start = Instant::now();
        assert!(queue.begin(Duration::from_millis(50)).is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(1));
        assert_eq!(queue.len(), 3);
        assert_eq!(queues.len(), 3);

        // Polling frees a slot for an immediate begin
        assert_eq!(queue.poll(), Some(5));
        assert_eq!(queue.len(), 2);
        let start = Instant::now();
        let transaction = queue.begin(Duration::from_secs(1)).unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
        transaction.commit(7);
        assert_eq!(queue.poll(), Some(9));
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(7));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn test_local_capacity_clamped_to_global() {
        let queues = TransactionalMultiQueue::<u8>::new(2, &[5, 1]);
        assert_eq!(queues.queue(0).capacity(), 2);
        assert_eq!(queues.queue(1).capacity(), 1);
        assert_eq!(queues.capacity(), 2);
        assert_eq!(queues.queues().len(), 2);
    }

    #[test]
    fn test_rollback_restores_capacity() {
        let queues = TransactionalMultiQueue::new(1, &[1, 1]);
        let transaction = queues.queue(0).begin(Duration::ZERO).unwrap();
        assert_eq!(transaction.queue(), 0);

        // The global permit is spoken for
        assert!(queues.queue(1).begin(Duration::ZERO).is_none());
        assert!(format!("{:?}", queues.queue(1)).contains("global_available: 0"));
        transaction.rollback();
        assert!(queues.is_empty());
        assert!(format!("{:?}", queues.queue(1)).contains("global_available: 1"));

        let transaction = queues.queue(1).begin(Duration::ZERO).unwrap();
        transaction.commit(1u8);
        assert_eq!(queues.queue(1).poll(), Some(1));
    }

    #[test]
    fn test_drop_rolls_back() {
        let queues = TransactionalMultiQueue::<u8>::new(1, &[1]);
        {
            let _transaction = queues.queue(0).begin(Duration::ZERO).unwrap();
        }
        assert!(queues.queue(0).begin(Duration::ZERO).is_some());
        assert!(queues.is_empty());
    }

    #[test]
    fn test_lock_excludes_second_producer() {
        let queues = TransactionalMultiQueue::<u8>::new(4, &[4]);
        let queue = queues.queue(0);
        let first = queue.begin(Duration::ZERO).unwrap();

        // Capacity remains but the transaction lock is held
        assert!(queue.begin(Duration::from_millis(10)).is_none());
        first.commit(1);
        let second = queue.begin(Duration::ZERO).unwrap();
        second.commit(2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_failed_begin_has_no_effect() {
        let queues = TransactionalMultiQueue::new(2, &[2, 2]);
        queues.queue(0).begin(Duration::ZERO).unwrap().commit(1);
        queues.queue(0).begin(Duration::ZERO).unwrap().commit(2);
        let before = (queues.len(), queues.queue(0).len(), queues.queue(1).len());

        // Global capacity exhausted: the lock and local permit taken along the way are returned
        assert!(queues.queue(1).begin(Duration::from_millis(20)).is_none());
        let after = (queues.len(), queues.queue(0).len(), queues.queue(1).len());
        assert_eq!(before, after);

        // Once room appears queue 1 can begin with its full local capacity
        assert_eq!(queues.queue(0).poll(), Some(1));
        assert_eq!(queues.queue(0).poll(), Some(2));
        queues.queue(1).begin(Duration::ZERO).unwrap().commit(3);
        queues.queue(1).begin(Duration::ZERO).unwrap().commit(4);
        assert_eq!(queues.queue(1).len(), 2);
    }

    #[test]
    fn test_begin_waits_for_poll() {
        let queues = TransactionalMultiQueue::new(1, &[1]);
        queues.queue(0).begin(Duration::ZERO).unwrap().commit(1);
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                assert_eq!(queues.queue(0).poll(), Some(1));
            });
            let transaction = queues.queue(0).begin(Duration::from_secs(5));
            transaction.expect("poll should free capacity").commit(2);
        });
        assert_eq!(queues.queue(0).poll(), Some(2));
    }

    #[test_traced]
    fn test_concurrent_capacity_invariant() {
        const GLOBAL: usize = 6;
        let locals = [4, 2, 3, 5];
        let queues = TransactionalMultiQueue::new(GLOBAL, &locals);
        let done = AtomicBool::new(false);
        thread::scope(|s| {
            // Producers: two per queue, mixing commits and rollbacks
            for id in 0..locals.len() {
                for seed in 0..2u64 {
                    let queues = &queues;
                    s.spawn(move || {
                        let mut rng = StdRng::seed_from_u64(id as u64 * 10 + seed);
                        for i in 0..2_000 {
                            let Some(transaction) =
                                queues.queue(id).begin(Duration::from_micros(200))
                            else {
                                continue;
                            };
                            if rng.gen_bool(0.8) {
                                transaction.commit(i);
                            } else {
                                transaction.rollback();
                            }
                        }
                    });
                }
            }

            // Observer
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    assert!(queues.len() <= GLOBAL);
                    for (queue, local) in queues.queues().iter().zip(locals) {
                        assert!(queue.len() <= local.min(GLOBAL));
                    }
                }
            });

            // Consumer
            s.spawn(|| {
                let mut rng = StdRng::seed_from_u64(99);
                for _ in 0..100_000 {
                    let id = rng.gen_range(0..locals.len());
                    let _ = queues.queue(id).poll();
                }
                done.store(true, Ordering::Release);
            });
        });

        // Drain and confirm every permit came back
        for queue in queues.queues() {
            while queue.poll().is_some() {}
        }
        assert!(queues.is_empty());
        assert_eq!(queues.free(), GLOBAL);
        for (id, local) in locals.iter().enumerate() {
            let capacity = (*local).min(GLOBAL);
            let held: Vec<_> = (0..capacity)
                .map(|_| queues.queue(id).begin(Duration::ZERO).map(|t| t.commit(0)))
                .collect();
            assert!(held.iter().all(Option::is_some));
            while queues.queue(id).poll().is_some() {}
        }
    }

    #[test]
    fn test_len_never_exceeds_capacity_under_handoff() {
        let queues = TransactionalMultiQueue::new(1, &[1]);
        let done = AtomicBool::new(false);
        let worst = AtomicUsize::new(0);
        thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    worst.fetch_max(queues.len(), Ordering::Relaxed);
                }
            });
            s.spawn(|| {
                for i in 0..50_000 {
                    queues
                        .queue(0)
                        .begin(Duration::from_secs(1))
                        .unwrap()
                        .commit(i);
                }
            });
            s.spawn(|| {
                let mut received = 0;
                while received < 50_000 {
                    if queues.queue(0).poll().is_some() {
                        received += 1;
                    } else {
                        thread::yield_now();
                    }
                }
                done.store(true, Ordering::Release);
            });
        });
        assert!(worst.load(Ordering::Relaxed) <= 1);
        assert!(queues.is_empty());
    }

    #[cfg(feature = "diagnostics")]
    #[test]
    fn test_diagnostics_counts() {
        let queues = TransactionalMultiQueue::new(2, &[2]);
        let queue = queues.queue(0);
        queue.begin(Duration::ZERO).unwrap().commit(1);
        queue.begin(Duration::ZERO).unwrap().rollback();
        drop(queue.begin(Duration::ZERO));
        assert!(queue.begin(Duration::ZERO).is_some());
        let counts = queue.diagnostics();
        assert_eq!(counts.begins, 4);
        assert_eq!(counts.commits, 1);
        assert_eq!(counts.rollbacks, 3);
    }
}
