//! Bind payloads to a bounded pool of small integer keys.
//!
//! A [SlotStore] lets a queue move cheap [Key]s while the payloads themselves sit in a side
//! table. A key is issued by [SlotStore::set] and consumed by [SlotStore::get], which clears the
//! slot (so the store never retains a stale payload) and returns the key to the free pool.
//!
//! [Key] is move-only, so each `set` can be redeemed at most once.
//!
//! # Example
//!
//! ```rust
//! use sluice_storage::slot_store::SlotStore;
//!
//! let store = SlotStore::new(2);
//! let key = store.set("hello").unwrap();
//! assert_eq!(store.available(), 1);
//! assert_eq!(store.get(key), "hello");
//! assert_eq!(store.available(), 2);
//! ```

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_STORE: AtomicU64 = AtomicU64::new(0);

/// Errors that can occur when interacting with a [SlotStore].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error<P> {
    /// Every key is bound to a payload. The rejected payload is handed back. A store sized to
    /// its owning queue's capacity never reaches this.
    #[error("slot store exhausted (capacity {capacity})")]
    Exhausted { capacity: usize, payload: P },
}

impl<P> Error<P> {
    /// Recover the payload that could not be stored.
    pub fn into_payload(self) -> P {
        match self {
            Self::Exhausted { payload, .. } => payload,
        }
    }
}

/// A ticket redeemable exactly once for the payload stored under it.
#[must_use = "dropping a key leaks its slot until the store is dropped"]
#[derive(Debug, PartialEq, Eq)]
pub struct Key {
    store: u64,
    index: u32,
}

impl Key {
    /// The integer position of this key within its store.
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// A fixed table of payload slots addressed by [Key].
pub struct SlotStore<P> {
    id: u64,
    slots: Vec<Mutex<Option<P>>>,
    free: ArrayQueue<u32>,
}

impl<P> std::fmt::Debug for SlotStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotStore")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

impl<P> SlotStore<P> {
    /// Create a store with `capacity` free keys.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "slot store capacity must be non-zero");
        let count = u32::try_from(capacity).expect("slot store capacity exceeds u32");
        let free = ArrayQueue::new(capacity);
        for index in 0..count {
            free.push(index).expect("free pool sized to capacity");
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Mutex::new(None));
        Self {
            id: NEXT_STORE.fetch_add(1, Ordering::Relaxed),
            slots,
            free,
        }
    }

    /// Total number of keys.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Keys not currently bound to a payload.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Store `payload` under a free key.
    ///
    /// If every key is bound, `payload` is returned inside the error.
    pub fn set(&self, payload: P) -> Result<Key, Error<P>> {
        let Some(index) = self.free.pop() else {
            return Err(Error::Exhausted {
                capacity: self.capacity(),
                payload,
            });
        };
        let previous = self.slots[index as usize].lock().replace(payload);
        debug_assert!(previous.is_none(), "free key {index} was still bound");
        Ok(Key {
            store: self.id,
            index,
        })
    }

    /// Redeem `key`, clearing its slot and returning the key to the free pool.
    ///
    /// # Panics
    ///
    /// Panics if `key` was issued by a different store.
    pub fn get(&self, key: Key) -> P {
        assert_eq!(key.store, self.id, "key issued by a different slot store");
        let payload = self.slots[key.index as usize]
            .lock()
            .take()
            .expect("issued key must be bound");
        self.free
            .push(key.index)
            .expect("free pool cannot overflow its capacity");
        payload
    }
}
