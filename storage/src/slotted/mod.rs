//! Carve many logical queues out of one preallocated slot array.
//!
//! A slotted store owns `capacity` slots. Each slot carries `next`/`prev` links and a data cell.
//! Unused slots are threaded onto a single free list; every member queue threads its occupied
//! slots onto its own list. Adding a value moves one slot from the free list to the member's
//! tail; removing a value clears the slot and moves it back. Both are O(1), and total memory is
//! bounded by `capacity` no matter how many members exist.
//!
//! ```text
//!   slots:   [0] [1] [2] [3] [4] [5]
//!   free:     1 -> 4
//!   member a: 0 -> 3 -> 5
//!   member b: 2
//! ```
//!
//! Two flavors are provided:
//!
//! - [Queue]: a shareable (`Send + Sync`) store whose [Member] handles expose FIFO
//!   `add`/`remove`.
//! - [Deque]: a single-owner store whose members support insertion and removal at both ends,
//!   iteration, and removal through a [CursorMut] at any position.
//!
//! Slot indices are never exposed. Callers hold member handles only, and a [MemberId] is tagged
//! with the store that issued it.
//!
//! # Exhaustion
//!
//! Adding to an exhausted store is a contract violation (callers bound their inserts by
//! capacity first) and panics. [Member::try_add] is available when the caller wants to probe.
//!
//! # Example
//!
//! ```rust
//! use sluice_storage::slotted::Queue;
//!
//! let store = Queue::new(4);
//! let a = store.add_member();
//! let b = store.add_member();
//!
//! a.add("first");
//! b.add("second");
//! a.add("third");
//! assert_eq!(store.free(), 1);
//!
//! assert_eq!(a.remove(), "first");
//! assert_eq!(b.remove(), "second");
//! assert_eq!(a.size(), 1);
//! assert_eq!(store.free(), 3);
//! ```

mod arena;
mod deque;
mod queue;

pub use deque::{CursorMut, Deque, Iter, MemberId};
pub use queue::{Member, Queue};
