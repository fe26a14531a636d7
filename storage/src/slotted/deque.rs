use super::arena::{next_owner, Arena, End};

/// Handle to one member of a [Deque].
///
/// Handles are tagged with the identity of the [Deque] that issued them, so a handle cannot
/// be used to reach into a different store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberId {
    owner: u64,
    index: usize,
}

/// A fixed slot array shared by any number of double-ended member queues.
///
/// Unlike [super::Queue], a [Deque] is owned by a single caller and mutated through
/// `&mut self`. Wrap it in a lock to share it.
pub struct Deque<T> {
    owner: u64,
    arena: Arena<T>,
}

impl<T> std::fmt::Debug for Deque<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deque")
            .field("capacity", &self.arena.capacity())
            .field("free", &self.arena.free())
            .finish()
    }
}

impl<T> Deque<T> {
    /// Preallocate `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            owner: next_owner(),
            arena: Arena::new(capacity),
        }
    }

    /// Carve a new, empty member out of the shared slot array.
    pub fn add_member(&mut self) -> MemberId {
        MemberId {
            owner: self.owner,
            index: self.arena.add_member(),
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// Slots not held by any member.
    pub fn free(&self) -> usize {
        self.arena.free()
    }

    fn member(&self, id: MemberId) -> usize {
        assert_eq!(id.owner, self.owner, "member belongs to a different deque");
        id.index
    }

    fn insert(&mut self, id: MemberId, end: End, value: T) {
        let member = self.member(id);
        if self.arena.insert(member, end, value).is_err() {
            panic!("slotted storage exhausted");
        }
    }

    /// Insert `value` at the head of `id`.
    ///
    /// # Panics
    ///
    /// Panics if the shared slot array is exhausted or `id` belongs to another deque.
    pub fn push_front(&mut self, id: MemberId, value: T) {
        self.insert(id, End::Front, value);
    }

    /// Insert `value` at the tail of `id`.
    ///
    /// # Panics
    ///
    /// Panics if the shared slot array is exhausted or `id` belongs to another deque.
    pub fn push_back(&mut self, id: MemberId, value: T) {
        self.insert(id, End::Back, value);
    }

    /// Remove the value at the head of `id`, if any.
    pub fn pop_front(&mut self, id: MemberId) -> Option<T> {
        let member = self.member(id);
        let head = self.arena.head(member)?;
        Some(self.arena.remove(member, head))
    }

    /// Remove the value at the tail of `id`, if any.
    pub fn pop_back(&mut self, id: MemberId) -> Option<T> {
        let member = self.member(id);
        let tail = self.arena.tail(member)?;
        Some(self.arena.remove(member, tail))
    }

    /// Peek at the head of `id`.
    pub fn front(&self, id: MemberId) -> Option<&T> {
        let member = self.member(id);
        self.arena.head(member).and_then(|i| self.arena.get(i))
    }

    /// Peek at the tail of `id`.
    pub fn back(&self, id: MemberId) -> Option<&T> {
        let member = self.member(id);
        self.arena.tail(member).and_then(|i| self.arena.get(i))
    }

    /// Values held by `id`.
    pub fn len(&self, id: MemberId) -> usize {
        self.arena.len(self.member(id))
    }

    /// Returns true if `id` holds no values.
    pub fn is_empty(&self, id: MemberId) -> bool {
        self.len(id) == 0
    }

    /// Iterate over the values of `id` from head to tail.
    pub fn iter(&self, id: MemberId) -> Iter<'_, T> {
        let member = self.member(id);
        Iter {
            arena: &self.arena,
            cursor: self.arena.head(member),
        }
    }

    /// A cursor over `id` positioned at its head, able to remove values as it walks.
    pub fn cursor_mut(&mut self, id: MemberId) -> CursorMut<'_, T> {
        let member = self.member(id);
        let current = self.arena.head(member);
        CursorMut {
            arena: &mut self.arena,
            member,
            current,
        }
    }

    /// Keep only the values of `id` for which `f` returns true, preserving order.
    pub fn retain(&mut self, id: MemberId, mut f: impl FnMut(&T) -> bool) {
        let mut cursor = self.cursor_mut(id);
        while let Some(value) = cursor.current() {
            if f(value) {
                cursor.move_next();
            } else {
                cursor.remove_current();
            }
        }
    }

    #[cfg(test)]
    pub(super) fn check(&self) {
        self.arena.check();
    }
}

/// Head-to-tail iterator over one member of a [Deque].
pub struct Iter<'a, T> {
    arena: &'a Arena<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        self.cursor = self.arena.next(index);
        self.arena.get(index)
    }
}

/// A cursor over one member of a [Deque] that can remove the value it points at.
///
/// Removal works at any position (head, tail, or interior) and leaves the cursor on the
/// value that followed the removed one.
pub struct CursorMut<'a, T> {
    arena: &'a mut Arena<T>,
    member: usize,
    current: Option<usize>,
}

impl<T> CursorMut<'_, T> {
    /// The value under the cursor, or `None` once the cursor has walked past the tail.
    pub fn current(&self) -> Option<&T> {
        self.current.and_then(|i| self.arena.get(i))
    }

    /// Mutable access to the value under the cursor.
    pub fn current_mut(&mut self) -> Option<&mut T> {
        let index = self.current?;
        self.arena.get_mut(index)
    }

    /// Advance toward the tail.
    pub fn move_next(&mut self) {
        if let Some(index) = self.current {
            self.current = self.arena.next(index);
        }
    }

    /// Remove the value under the cursor and advance to its successor.
    pub fn remove_current(&mut self) -> Option<T> {
        let index = self.current?;
        self.current = self.arena.next(index);
        Some(self.arena.remove(self.member, index))
    }
}
