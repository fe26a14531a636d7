//! All-or-nothing delivery of one payload to several connections.
//!
//! [Sender::send] runs three phases:
//!
//! 1. _Locking_: lock every target in list order. With a zero timeout every target is tried
//!    even after a failure, so the error lists the full set of unavailable targets. With a
//!    non-zero timeout each lock waits only for what remains of the budget, and locking stops
//!    at the first target that times out.
//! 2. _Committing_: only if every lock was obtained, commit the payload to every target in the
//!    same order.
//! 3. _Releasing_: unlock every target, rolling back the reservations of a failed send.
//!
//! Atomicity is enforced before anything is committed: once every lock is held, each commit is
//! guaranteed room, so there is never a partial commit to undo.
//!
//! An _orderly_ sender additionally serializes whole sends behind a sender-wide lock, so two
//! concurrent sends through the same sender land on every shared target in the same relative
//! order.

use crate::{Connector, Token};
use parking_lot::Mutex;
use sluice_utils::Deadline;
use std::{collections::HashSet, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::trace;

/// Errors that can occur when sending.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The sender-wide lock of an orderly sender was not obtained in time.
    #[error("sender busy")]
    Busy,
    /// These targets could not be locked, so nothing was committed.
    #[error("targets unavailable: {0:?}")]
    Unavailable(Vec<usize>),
}

/// Delivers each payload to every target connection or to none of them.
pub struct Sender<P> {
    connector: Arc<Connector<P>>,
    targets: Vec<usize>,
    order: Option<Mutex<()>>,
}

impl<P> std::fmt::Debug for Sender<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("targets", &self.targets)
            .field("orderly", &self.order.is_some())
            .finish()
    }
}

impl<P: Clone> Sender<P> {
    /// Create a sender that delivers atomically to `targets`.
    ///
    /// # Panics
    ///
    /// Panics if `targets` is empty, names an unknown connection, or names a connection twice.
    pub fn atomic(connector: Arc<Connector<P>>, targets: Vec<usize>) -> Self {
        assert!(!targets.is_empty(), "at least one target is required");
        let mut seen = HashSet::with_capacity(targets.len());
        for &target in &targets {
            assert!(
                target < connector.connections().len(),
                "unknown target connection {target}"
            );
            assert!(seen.insert(target), "duplicate target connection {target}");
        }
        Self {
            connector,
            targets,
            order: None,
        }
    }

    /// Create a sender that delivers atomically to `targets` and serializes whole sends.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [Sender::atomic].
    pub fn orderly(connector: Arc<Connector<P>>, targets: Vec<usize>) -> Self {
        Self {
            order: Some(Mutex::new(())),
            ..Self::atomic(connector, targets)
        }
    }

    /// Target connection ids, in locking order.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Deliver `payload` to every target, waiting at most `timeout` in total.
    ///
    /// A zero `timeout` never blocks. On failure no target receives the payload.
    pub fn send(&self, payload: P, timeout: Duration) -> Result<(), Error> {
        let deadline = Deadline::after(timeout);
        let _order = match &self.order {
            Some(order) => Some(order.try_lock_for(deadline.remaining()).ok_or(Error::Busy)?),
            None => None,
        };

        // Locking
        let connections = self.connector.connections();
        let mut tokens: Vec<Option<Token<'_, P>>> = Vec::with_capacity(self.targets.len());
        let mut unavailable = Vec::new();
        for &target in &self.targets {
            let token = connections[target].lock(deadline.remaining());
            if token.is_none() {
                trace!(target, "target unavailable");
                unavailable.push(target);
                if !timeout.is_zero() {
                    break;
                }
            }
            tokens.push(token);
        }

        // Committing
        if unavailable.is_empty() {
            let (last, rest) = tokens.split_last_mut().expect("targets are non-empty");
            for token in rest {
                let token = token.as_mut().expect("every target is locked");
                connections[token.connection()].commit(token, payload.clone());
            }
            let token = last.as_mut().expect("every target is locked");
            connections[token.connection()].commit(token, payload);
        }

        // Releasing
        for (&target, token) in self.targets.iter().zip(tokens) {
            connections[target].unlock(token);
        }
        if unavailable.is_empty() {
            Ok(())
        } else {
            Err(Error::Unavailable(unavailable))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Global, Schedule};
    use sluice_macros::test_traced;
    use std::{thread, time::Instant};

    fn connector(capacities: Vec<usize>) -> Arc<Connector<u32>> {
        Arc::new(Connector::new(Config {
            capacities,
            global: Global::Independent,
            schedule: Schedule::Fifo,
        }))
    }

    fn fill(connector: &Connector<u32>, id: usize, payload: u32) {
        let connection = connector.connection(id);
        let mut token = connection.lock(Duration::ZERO).unwrap();
        connection.commit(&mut token, payload);
        connection.unlock(Some(token));
    }

    fn drain(connector: &Connector<u32>, id: usize) -> Vec<u32> {
        std::iter::from_fn(|| connector.connection(id).poll()).collect()
    }

    #[test_traced]
    fn test_send_reaches_every_target() {
        let connector = connector(vec![2, 2, 2]);
        let sender = Sender::atomic(connector.clone(), vec![0, 2]);
        sender.send(7, Duration::ZERO).unwrap();
        sender.send(8, Duration::ZERO).unwrap();
        assert_eq!(drain(&connector, 0), vec![7, 8]);
        assert_eq!(drain(&connector, 1), Vec::<u32>::new());
        assert_eq!(drain(&connector, 2), vec![7, 8]);
    }

    #[test_traced]
    fn test_failed_lock_leaves_other_targets_unchanged() {
        let connector = connector(vec![4, 4, 4]);
        let sender = Sender::atomic(connector.clone(), vec![0, 1, 2]);
        let before: Vec<_> = connector.connections().iter().map(|c| c.local_size()).collect();

        // Hold the middle target's lock
        let held = connector.connection(1).lock(Duration::ZERO).unwrap();
        assert_eq!(
            sender.send(1, Duration::ZERO),
            Err(Error::Unavailable(vec![1]))
        );
        let after: Vec<_> = connector.connections().iter().map(|c| c.local_size()).collect();
        assert_eq!(before, after);
        assert_eq!(connector.global_size(), 0);

        // Reservations on the other targets were rolled back, not leaked
        connector.connection(1).unlock(Some(held));
        for _ in 0..4 {
            sender.send(2, Duration::ZERO).unwrap();
        }
        assert_eq!(connector.global_size(), 12);
    }

    #[test]
    fn test_non_blocking_reports_every_failure() {
        let connector = connector(vec![1, 1, 1]);
        fill(&connector, 0, 1);
        fill(&connector, 2, 1);
        let sender = Sender::atomic(connector.clone(), vec![0, 1, 2]);
        assert_eq!(
            sender.send(5, Duration::ZERO),
            Err(Error::Unavailable(vec![0, 2]))
        );
        assert_eq!(connector.connection(1).local_size(), 0);
    }

    #[test]
    fn test_timed_send_stops_at_first_timeout() {
        let connector = connector(vec![1, 1, 1]);
        fill(&connector, 0, 1);
        fill(&connector, 2, 1);
        let sender = Sender::atomic(connector.clone(), vec![0, 1, 2]);
        let start = Instant::now();
        assert_eq!(
            sender.send(5, Duration::from_millis(30)),
            Err(Error::Unavailable(vec![0]))
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(connector.connection(1).local_size(), 0);
    }

    #[test]
    fn test_timed_send_waits_for_room() {
        let connector = connector(vec![1, 1]);
        let sender = Sender::atomic(connector.clone(), vec![0, 1]);
        sender.send(1, Duration::ZERO).unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                assert_eq!(connector.connection(0).poll(), Some(1));
                assert_eq!(connector.connection(1).poll(), Some(1));
            });
            sender.send(2, Duration::from_secs(5)).unwrap();
        });
        assert_eq!(drain(&connector, 0), vec![2]);
        assert_eq!(drain(&connector, 1), vec![2]);
    }

    #[test]
    fn test_orderly_busy() {
        let connector = connector(vec![1]);
        let sender = Sender::orderly(connector, vec![0]);
        let order = sender.order.as_ref().unwrap().lock();
        assert_eq!(sender.send(1, Duration::ZERO), Err(Error::Busy));
        drop(order);
        assert_eq!(sender.send(1, Duration::ZERO), Ok(()));
    }

    #[test_traced]
    fn test_orderly_sends_land_in_same_order() {
        const SENDS: u32 = 2_000;
        let connector = connector(vec![2 * SENDS as usize, 2 * SENDS as usize]);
        let sender = Sender::orderly(connector.clone(), vec![0, 1]);
        thread::scope(|s| {
            for t in 0..2 {
                let sender = &sender;
                s.spawn(move || {
                    let mut sent = 0;
                    while sent < SENDS {
                        if sender.send(t * SENDS + sent, Duration::ZERO).is_ok() {
                            sent += 1;
                        }
                    }
                });
            }
        });
        let x = drain(&connector, 0);
        let y = drain(&connector, 1);
        assert_eq!(x.len(), 2 * SENDS as usize);
        assert_eq!(x, y);
    }

    #[test]
    #[should_panic(expected = "duplicate target connection 1")]
    fn test_duplicate_target_panics() {
        let _ = Sender::atomic(connector(vec![1, 1]), vec![1, 0, 1]);
    }

    #[test]
    #[should_panic(expected = "unknown target connection 3")]
    fn test_unknown_target_panics() {
        let _ = Sender::atomic(connector(vec![1, 1]), vec![3]);
    }
}
