use super::arena::{Arena, End};
use parking_lot::Mutex;
use std::sync::Arc;

/// A fixed slot array shared by any number of FIFO [Member] queues.
///
/// Cloning a [Queue] yields another handle to the same slot array.
pub struct Queue<T> {
    arena: Arc<Mutex<Arena<T>>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            arena: self.arena.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.arena.lock();
        f.debug_struct("Queue")
            .field("capacity", &arena.capacity())
            .field("free", &arena.free())
            .finish()
    }
}

impl<T> Queue<T> {
    /// Preallocate `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: Arc::new(Mutex::new(Arena::new(capacity))),
        }
    }

    /// Carve a new, empty member queue out of the shared slot array.
    pub fn add_member(&self) -> Member<T> {
        let index = self.arena.lock().add_member();
        Member {
            arena: self.arena.clone(),
            index,
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.arena.lock().capacity()
    }

    /// Slots not held by any member.
    pub fn free(&self) -> usize {
        self.arena.lock().free()
    }

    /// Values held across all members.
    pub fn len(&self) -> usize {
        self.arena.lock().used()
    }

    /// Returns true if no member holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One FIFO queue carved out of a [Queue].
pub struct Member<T> {
    arena: Arc<Mutex<Arena<T>>>,
    index: usize,
}

impl<T> std::fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("index", &self.index)
            .field("size", &self.size())
            .finish()
    }
}

impl<T> Member<T> {
    /// Append `value` to the tail of this member.
    ///
    /// # Panics
    ///
    /// Panics if the shared slot array is exhausted. Callers are expected to bound their
    /// inserts by capacity before calling (see [Member::try_add] for a checked variant).
    pub fn add(&self, value: T) {
        if self.try_add(value).is_err() {
            panic!("slotted storage exhausted");
        }
    }

    /// Append `value` to the tail of this member, returning it if no slot is free.
    pub fn try_add(&self, value: T) -> Result<(), T> {
        self.arena
            .lock()
            .insert(self.index, End::Back, value)
            .map(|_| ())
    }

    /// Remove the value at the head of this member.
    ///
    /// # Panics
    ///
    /// Panics if this member is empty.
    pub fn remove(&self) -> T {
        self.try_remove().expect("member queue is empty")
    }

    /// Remove the value at the head of this member, if any.
    pub fn try_remove(&self) -> Option<T> {
        let mut arena = self.arena.lock();
        let head = arena.head(self.index)?;
        Some(arena.remove(self.index, head))
    }

    /// Values held by this member.
    pub fn size(&self) -> usize {
        self.arena.lock().len(self.index)
    }

    /// Returns true if this member holds no values.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[cfg(test)]
    pub(super) fn check(&self) {
        self.arena.lock().check();
    }
}
