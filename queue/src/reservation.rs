//! A bounded queue fed through per-producer overflow buckets.
//!
//! Each producer is assigned one bucket (by a fixed integer key agreed out-of-band). To insert, a
//! producer first wins the bucket's permit with [ReservationQueue::reserve], then parks its value
//! in the bucket with [Reservation::add]. Parked values are migrated into the shared queue, in
//! bucket order, whenever room exists: on every `add` and on every [ReservationQueue::poll].
//!
//! A bucket holds at most one value, and its permit stays taken until that value has been
//! migrated. A producer whose value is still parked therefore cannot reserve again, which bounds
//! the total number of values (queued plus parked) by `capacity + producers`, while the shared
//! queue itself never exceeds `capacity`.
//!
//! Consumer permits are released one per migrated value, so the number of consumer permits
//! always matches the number of values in the shared queue.
//!
//! # Example
//!
//! ```rust
//! use sluice_queue::reservation::ReservationQueue;
//! use std::time::Duration;
//!
//! let queue = ReservationQueue::new(1, 2);
//!
//! // Producer 0 fills the queue
//! queue.reserve(0, Duration::ZERO).unwrap().add("a");
//!
//! // Producer 1 parks its value in its bucket
//! queue.reserve(1, Duration::ZERO).unwrap().add("b");
//! assert_eq!(queue.len(), 1);
//! assert_eq!(queue.pending(), 1);
//!
//! // Producer 1 cannot reserve again until its value migrates
//! assert!(queue.reserve(1, Duration::ZERO).is_none());
//!
//! // Polling frees room and migrates the parked value
//! assert_eq!(queue.poll(Duration::ZERO), Some("a"));
//! assert_eq!(queue.poll(Duration::ZERO), Some("b"));
//! assert!(queue.reserve(1, Duration::ZERO).is_some());
//! ```

use parking_lot::Mutex;
use sluice_storage::slotted;
use sluice_utils::Semaphore;
use std::time::Duration;
use tracing::trace;

/// One producer's overflow bucket.
struct Bucket<T> {
    permit: Semaphore,
    value: Mutex<Option<T>>,
}

/// A bounded queue whose producers insert through overflow buckets.
pub struct ReservationQueue<T> {
    buckets: Vec<Bucket<T>>,
    queue: slotted::Member<T>,
    capacity: usize,
    consumers: Semaphore,
}

impl<T> std::fmt::Debug for ReservationQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationQueue")
            .field("capacity", &self.capacity)
            .field("producers", &self.buckets.len())
            .field("len", &self.len())
            .finish()
    }
}

impl<T> ReservationQueue<T> {
    /// Create a queue holding at most `capacity` values, fed by `producers` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `producers` is zero.
    pub fn new(capacity: usize, producers: usize) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        assert!(producers > 0, "at least one producer is required");
        let mut buckets = Vec::with_capacity(producers);
        buckets.resize_with(producers, || Bucket {
            permit: Semaphore::new(1),
            value: Mutex::new(None),
        });
        Self {
            buckets,
            queue: slotted::Queue::new(capacity).add_member(),
            capacity,
            consumers: Semaphore::new(0),
        }
    }

    /// Maximum number of values held by the shared queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of producer buckets.
    pub fn producers(&self) -> usize {
        self.buckets.len()
    }

    /// Values in the shared queue (excluding parked values).
    pub fn len(&self) -> usize {
        self.queue.size()
    }

    /// Returns true if the shared queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values parked in buckets awaiting room in the shared queue.
    pub fn pending(&self) -> usize {
        self.buckets
            .iter()
            .filter(|bucket| bucket.value.lock().is_some())
            .count()
    }

    /// Win the bucket of `producer`, waiting at most `timeout`.
    ///
    /// Returns `None` if the bucket is still held (by an unfinished [Reservation] or by a
    /// value that has not yet migrated). A zero `timeout` never blocks.
    ///
    /// # Panics
    ///
    /// Panics if `producer` is not a valid bucket key.
    pub fn reserve(&self, producer: usize, timeout: Duration) -> Option<Reservation<'_, T>> {
        assert!(producer < self.buckets.len(), "unknown producer {producer}");
        if !self.buckets[producer].permit.acquire(timeout) {
            return None;
        }
        Some(Reservation {
            queue: self,
            producer,
            used: false,
        })
    }

    /// Remove the value at the head of the queue, waiting at most `timeout` for one.
    pub fn poll(&self, timeout: Duration) -> Option<T> {
        if !self.consumers.acquire(timeout) {
            return None;
        }

        // A producer may have parked a value after the queue was last full
        self.migrate();
        let value = self
            .queue
            .try_remove()
            .expect("consumer permit without a queued value");
        self.migrate();
        Some(value)
    }

    /// Move parked values into the shared queue, in bucket order, while room remains.
    ///
    /// Bounded by the number of buckets.
    fn migrate(&self) {
        for (producer, bucket) in self.buckets.iter().enumerate() {
            let mut slot = bucket.value.lock();
            let Some(value) = slot.take() else {
                continue;
            };
            if let Err(value) = self.queue.try_add(value) {
                // Queue is full: later buckets cannot fit either
                *slot = Some(value);
                return;
            }
            drop(slot);
            trace!(producer, "migrated parked value");
            bucket.permit.release();
            self.consumers.release();
        }
    }
}

/// The right to park one value in a producer's bucket.
///
/// Dropping an unused reservation gives the bucket back.
#[must_use = "dropping a reservation releases it without adding a value"]
pub struct Reservation<'a, T> {
    queue: &'a ReservationQueue<T>,
    producer: usize,
    used: bool,
}

impl<T> Reservation<'_, T> {
    /// The bucket key this reservation holds.
    pub fn producer(&self) -> usize {
        self.producer
    }

    /// Park `value` in the bucket and migrate whatever fits into the shared queue.
    ///
    /// The bucket stays held until `value` has been migrated.
    pub fn add(mut self, value: T) {
        let bucket = &self.queue.buckets[self.producer];
        let previous = bucket.value.lock().replace(value);
        assert!(previous.is_none(), "bucket held a value while reserved");
        self.used = true;
        self.queue.migrate();
    }
}

impl<T> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if !self.used {
            self.queue.buckets[self.producer].permit.release();
        }
    }
}
