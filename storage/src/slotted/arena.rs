use std::sync::atomic::{AtomicU64, Ordering};

/// Source of unique store identities, used to reject handles from a different store.
static NEXT_OWNER: AtomicU64 = AtomicU64::new(0);

pub(super) fn next_owner() -> u64 {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

/// A slot in the backing array.
struct Slot<T> {
    next: Option<usize>,
    prev: Option<usize>,
    data: Option<T>,
}

/// A doubly-linked list threaded through the slot array.
///
/// `head` and `tail` are `None` iff the list is empty.
#[derive(Clone, Copy, Debug, Default)]
struct List {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl List {
    fn push_back<T>(&mut self, slots: &mut [Slot<T>], index: usize) {
        slots[index].prev = self.tail;
        slots[index].next = None;
        match self.tail {
            Some(tail) => slots[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
    }

    fn push_front<T>(&mut self, slots: &mut [Slot<T>], index: usize) {
        slots[index].next = self.head;
        slots[index].prev = None;
        match self.head {
            Some(head) => slots[head].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;
    }

    fn unlink<T>(&mut self, slots: &mut [Slot<T>], index: usize) {
        let (prev, next) = (slots[index].prev, slots[index].next);
        match prev {
            Some(prev) => slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => slots[next].prev = prev,
            None => self.tail = prev,
        }
        slots[index].prev = None;
        slots[index].next = None;
        self.len -= 1;
    }
}

/// Where a value should be linked into a member list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum End {
    Front,
    Back,
}

/// A fixed array of slots partitioned between one free list and any number of member lists.
///
/// Every slot is in exactly one list at all times, so the member lengths plus the free length
/// always sum to the capacity.
pub(super) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: List,
    members: Vec<List>,
}

impl<T> Arena<T> {
    pub(super) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            next: None,
            prev: None,
            data: None,
        });
        let mut free = List::default();
        for index in 0..capacity {
            free.push_back(&mut slots, index);
        }
        Self {
            slots,
            free,
            members: Vec::new(),
        }
    }

    pub(super) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(super) fn free(&self) -> usize {
        self.free.len
    }

    pub(super) fn used(&self) -> usize {
        self.capacity() - self.free.len
    }

    pub(super) fn add_member(&mut self) -> usize {
        self.members.push(List::default());
        self.members.len() - 1
    }

    pub(super) fn len(&self, member: usize) -> usize {
        self.members[member].len
    }

    pub(super) fn head(&self, member: usize) -> Option<usize> {
        self.members[member].head
    }

    pub(super) fn tail(&self, member: usize) -> Option<usize> {
        self.members[member].tail
    }

    pub(super) fn next(&self, index: usize) -> Option<usize> {
        self.slots[index].next
    }

    pub(super) fn get(&self, index: usize) -> Option<&T> {
        self.slots[index].data.as_ref()
    }

    pub(super) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots[index].data.as_mut()
    }

    /// Move one slot from the free list into `member`, storing `value` in it.
    ///
    /// Returns the value back if no slot is free.
    pub(super) fn insert(&mut self, member: usize, end: End, value: T) -> Result<usize, T> {
        let Some(index) = self.free.head else {
            return Err(value);
        };
        self.free.unlink(&mut self.slots, index);
        self.slots[index].data = Some(value);
        let list = &mut self.members[member];
        match end {
            End::Front => list.push_front(&mut self.slots, index),
            End::Back => list.push_back(&mut self.slots, index),
        }
        Ok(index)
    }

    /// Unlink `index` from `member`, clear it, and return it to the free list.
    pub(super) fn remove(&mut self, member: usize, index: usize) -> T {
        self.members[member].unlink(&mut self.slots, index);
        let value = self.slots[index]
            .data
            .take()
            .expect("occupied slot must hold a value");
        self.free.push_back(&mut self.slots, index);
        value
    }

    /// Walk every list and confirm the slot indices are partitioned exactly once.
    #[cfg(test)]
    pub(super) fn check(&self) {
        let mut seen = vec![false; self.capacity()];
        let mut walk = |list: &List, occupied: bool| {
            let mut count = 0;
            let mut prev = None;
            let mut cursor = list.head;
            while let Some(index) = cursor {
                assert!(!seen[index], "slot {index} linked twice");
                seen[index] = true;
                assert_eq!(self.slots[index].prev, prev, "broken back link at {index}");
                assert_eq!(self.slots[index].data.is_some(), occupied);
                prev = Some(index);
                cursor = self.slots[index].next;
                count += 1;
            }
            assert_eq!(list.tail, prev, "tail does not match last node");
            assert_eq!(list.len, count, "length does not match list");
            assert_eq!(list.head.is_none(), list.len == 0);
        };
        walk(&self.free, false);
        for member in &self.members {
            walk(member, true);
        }
        assert!(seen.iter().all(|s| *s), "slot missing from every list");
        let used: usize = self.members.iter().map(|m| m.len).sum();
        assert_eq!(used + self.free.len, self.capacity());
    }
}
