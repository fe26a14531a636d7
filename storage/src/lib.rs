//! Bounded, preallocated storage backing sluice queues.
//!
//! Nothing in this crate allocates after construction: [slotted] carves any number of member
//! queues out of one fixed slot array and [slot_store] binds payloads to a fixed pool of keys.
//!
//! # Status
//!
//! `sluice-storage` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

pub mod slot_store;
pub mod slotted;
