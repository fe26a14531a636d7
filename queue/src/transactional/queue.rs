use sluice_storage::slotted;
use sluice_utils::{Deadline, Semaphore};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::trace;

#[cfg(feature = "diagnostics")]
use super::diagnostics::Diagnostics;

/// A family of [TransactionQueue]s sharing one global capacity.
///
/// Each member queue is bounded by its own local capacity (clamped to the global capacity),
/// and the members together never hold more than the global capacity. Local capacities may
/// sum to more than the global capacity (oversubscription).
pub struct TransactionalMultiQueue<T> {
    capacity: usize,
    size: Arc<AtomicUsize>,
    store: slotted::Queue<T>,
    queues: Vec<TransactionQueue<T>>,
}

impl<T> std::fmt::Debug for TransactionalMultiQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalMultiQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("queues", &self.queues)
            .finish()
    }
}

impl<T> TransactionalMultiQueue<T> {
    /// Create one member queue per entry of `local_capacities`, all bounded by `global_capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `global_capacity` or any local capacity is zero.
    pub fn new(global_capacity: usize, local_capacities: &[usize]) -> Self {
        assert!(global_capacity > 0, "global capacity must be non-zero");
        let global = Arc::new(Semaphore::new(global_capacity));
        let size = Arc::new(AtomicUsize::new(0));

        // The backing array never needs more than the global capacity: every value in it holds
        // a global permit.
        let store = slotted::Queue::new(global_capacity);
        let queues = local_capacities
            .iter()
            .enumerate()
            .map(|(id, &local)| {
                assert!(local > 0, "local capacity of queue {id} must be non-zero");
                let capacity = local.min(global_capacity);
                TransactionQueue {
                    id,
                    capacity,
                    lock: Semaphore::new(1),
                    local: Semaphore::new(capacity),
                    global: global.clone(),
                    size: size.clone(),
                    member: store.add_member(),
                    #[cfg(feature = "diagnostics")]
                    diagnostics: Diagnostics::default(),
                }
            })
            .collect();
        Self {
            capacity: global_capacity,
            size,
            store,
            queues,
        }
    }

    /// The global capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values held across every member queue.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Returns true if no member queue holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free slots in the shared backing array.
    pub fn free(&self) -> usize {
        self.store.free()
    }

    /// The member queue with the given `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn queue(&self, id: usize) -> &TransactionQueue<T> {
        &self.queues[id]
    }

    /// Every member queue, ordered by id.
    pub fn queues(&self) -> &[TransactionQueue<T>] {
        &self.queues
    }
}

/// One member of a [TransactionalMultiQueue].
///
/// Producers insert with [TransactionQueue::begin] followed by [Transaction::commit]. Only one
/// transaction may be open on a queue at a time.
pub struct TransactionQueue<T> {
    id: usize,
    capacity: usize,
    lock: Semaphore,
    local: Semaphore,
    global: Arc<Semaphore>,
    size: Arc<AtomicUsize>,
    member: slotted::Member<T>,
    #[cfg(feature = "diagnostics")]
    diagnostics: Diagnostics,
}

impl<T> std::fmt::Debug for TransactionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionQueue")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("global_available", &self.global.available())
            .finish()
    }
}

impl<T> TransactionQueue<T> {
    /// Position of this queue within its [TransactionalMultiQueue].
    pub fn id(&self) -> usize {
        self.id
    }

    /// The local capacity (never larger than the global capacity).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values held by this queue.
    pub fn len(&self) -> usize {
        self.member.size()
    }

    /// Returns true if this queue holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve room for one value, waiting at most `timeout` in total.
    ///
    /// Acquires, in order, the queue's transaction lock, a local permit, and a global permit.
    /// Each step waits only for whatever remains of `timeout`. If any step fails, everything
    /// acquired so far is released and `None` is returned, leaving the queue exactly as it
    /// was. A zero `timeout` never blocks.
    pub fn begin(&self, timeout: Duration) -> Option<Transaction<'_, T>> {
        let deadline = Deadline::after(timeout);
        if !self.lock.acquire(deadline.remaining()) {
            trace!(id = self.id, "transaction lock unavailable");
            return None;
        }
        if !self.local.acquire(deadline.remaining()) {
            self.lock.release();
            trace!(id = self.id, "local capacity exhausted");
            return None;
        }
        if !self.global.acquire(deadline.remaining()) {
            self.local.release();
            self.lock.release();
            trace!(id = self.id, "global capacity exhausted");
            return None;
        }
        #[cfg(feature = "diagnostics")]
        self.diagnostics.begin();
        Some(Transaction {
            queue: self,
            finished: false,
        })
    }

    /// Remove the value at the head of this queue, returning its local and global permits.
    pub fn poll(&self) -> Option<T> {
        self.poll_with(|value| value)
    }

    /// Remove the value at the head of this queue and pass it to `f`.
    ///
    /// The local and global permits are returned only after `f` completes, so any side storage
    /// keyed by the value is released before a producer can reuse the capacity.
    pub fn poll_with<R>(&self, f: impl FnOnce(T) -> R) -> Option<R> {
        let value = self.member.try_remove()?;
        let result = f(value);
        self.size.fetch_sub(1, Ordering::AcqRel);
        self.local.release();
        self.global.release();
        Some(result)
    }

    /// Begin, commit, and rollback counts recorded so far.
    #[cfg(feature = "diagnostics")]
    pub fn diagnostics(&self) -> super::diagnostics::Counts {
        self.diagnostics.counts()
    }
}

/// An open transaction holding room for exactly one value in a [TransactionQueue].
///
/// Consume it with [Transaction::commit] or [Transaction::rollback]. Dropping an open
/// transaction rolls it back.
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction<'a, T> {
    queue: &'a TransactionQueue<T>,
    finished: bool,
}

impl<T> std::fmt::Debug for Transaction<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("queue", &self.queue.id)
            .finish()
    }
}

impl<T> Transaction<'_, T> {
    /// Id of the queue this transaction belongs to.
    pub fn queue(&self) -> usize {
        self.queue.id
    }

    /// Write `value` into the reserved slot and release the transaction lock.
    ///
    /// The local and global permits stay taken until a consumer polls the value.
    ///
    /// # Panics
    ///
    /// Panics if the backing array has no free slot, which would mean the global permits
    /// and the array have diverged.
    pub fn commit(mut self, value: T) {
        let queue = self.queue;

        // Count the value before it becomes pollable so the total never underflows
        queue.size.fetch_add(1, Ordering::AcqRel);
        if queue.member.try_add(value).is_err() {
            queue.size.fetch_sub(1, Ordering::AcqRel);
            panic!("reserved slot unavailable in queue {}", queue.id);
        }
        self.finished = true;
        #[cfg(feature = "diagnostics")]
        queue.diagnostics.commit();
        queue.lock.release();
    }

    /// Give back the reservation: the lock, the local permit, and the global permit.
    pub fn rollback(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let queue = self.queue;
        #[cfg(feature = "diagnostics")]
        queue.diagnostics.rollback();
        queue.global.release();
        queue.local.release();
        queue.lock.release();
    }
}

impl<T> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}
