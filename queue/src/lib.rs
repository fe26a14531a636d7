//! Capacity-safe multi-producer queues.
//!
//! Producers never block one another and never push a queue past its capacity. Two protocols
//! solve this problem:
//!
//! - [reservation]: each producer owns a single overflow bucket. A producer wins its bucket,
//!   parks a value there, and any thread that touches the queue migrates parked values into
//!   the shared queue as room appears.
//! - [transactional]: a producer `begin`s a transaction that reserves capacity up front (a
//!   per-queue lock, a local permit, and a global permit shared by sibling queues), then
//!   either `commit`s a value into the reserved slot or `rollback`s the reservation.
//!
//! In both, capacity and timeouts are ordinary outcomes reported through return values, and
//! a producer that fails to reserve leaves no trace.
//!
//! # Status
//!
//! `sluice-queue` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

pub mod reservation;
pub mod transactional;
