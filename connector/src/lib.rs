//! Move payloads into bounded destinations with atomic fan-out and fair readiness.
//!
//! A [Connector] owns an ordered set of [Connection]s. Each connection is one bounded
//! destination backed by a [sluice_queue::transactional::TransactionQueue]; every connection
//! of a connector shares one global capacity.
//!
//! Producers enqueue with a three-step protocol: [Connection::lock] reserves room and returns
//! a [Token], [Connection::commit] stores the payload under that token, and
//! [Connection::unlock] releases the lock (rolling back if nothing was committed). A [Sender]
//! runs this protocol across several connections so that a payload reaches all of them or
//! none.
//!
//! Consumers ask [Connector::next_ready] for the id of a connection holding a payload and then
//! [Connection::poll] it. With [Schedule::RoundRobin], ids are served by a starvation-free
//! [round_robin::RoundRobin] scan.
//!
//! # Status
//!
//! `sluice-connector` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.
//!
//! # Example
//!
//! ```rust
//! use sluice_connector::{Config, Connector, Global, Schedule, Sender};
//! use std::{sync::Arc, time::Duration};
//!
//! let connector = Arc::new(Connector::new(Config {
//!     capacities: vec![2, 2, 2],
//!     global: Global::Bounded(4),
//!     schedule: Schedule::RoundRobin,
//! }));
//! assert_eq!(connector.global_capacity(), 4);
//!
//! // Deliver to connections 0 and 2 atomically
//! let sender = Sender::atomic(connector.clone(), vec![0, 2]);
//! sender.send("hello", Duration::ZERO).unwrap();
//! assert_eq!(connector.global_size(), 2);
//!
//! // Consume in round-robin order
//! let id = connector.next_ready(Duration::ZERO).unwrap();
//! assert_eq!(id, 0);
//! assert_eq!(connector.connection(id).poll(), Some("hello"));
//! let id = connector.next_ready(Duration::ZERO).unwrap();
//! assert_eq!(id, 2);
//! assert_eq!(connector.connection(id).poll(), Some("hello"));
//! ```

mod connection;
pub use connection::{Connection, Stats, Token};
mod connector;
pub use connector::Connector;
mod ready;
pub mod round_robin;
pub mod sender;
pub use sender::Sender;

/// How the connections of a [Connector] share capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Global {
    /// The connections share a pool of this many slots. Local capacities may add up to more
    /// than the pool (oversubscription) but never to more than the pool at once.
    Bounded(usize),
    /// Each connection is bounded only by its local capacity. The global capacity is the sum
    /// of the local capacities.
    Independent,
}

/// Order in which [Connector::next_ready] reports connections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Schedule {
    /// Report connections in commit order.
    #[default]
    Fifo,
    /// Report connections round-robin, so a busy connection cannot starve its siblings.
    RoundRobin,
}

/// Configuration for a [Connector].
#[derive(Clone, Debug)]
pub struct Config {
    /// Local capacity of each connection, indexed by connection id.
    pub capacities: Vec<usize>,

    /// How the connections share capacity.
    pub global: Global,

    /// Readiness schedule.
    pub schedule: Schedule,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_macros::test_traced;
    use std::{
        sync::{atomic::AtomicBool, Arc},
        thread,
        time::Duration,
    };

    fn commit<P>(connection: &Connection<P>, payload: P) {
        let mut token = connection.lock(Duration::ZERO).unwrap();
        connection.commit(&mut token, payload);
        connection.unlock(Some(token));
    }

    #[test]
    fn test_global_capacity() {
        let independent = Connector::<u8>::new(Config {
            capacities: vec![3, 4, 5],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        assert_eq!(independent.global_capacity(), 12);

        let bounded = Connector::<u8>::new(Config {
            capacities: vec![3, 4, 5],
            global: Global::Bounded(6),
            schedule: Schedule::Fifo,
        });
        assert_eq!(bounded.global_capacity(), 6);
        assert_eq!(bounded.connection(2).local_capacity(), 5);

        // Clamped local capacities can make the pool unreachable
        let clamped = Connector::<u8>::new(Config {
            capacities: vec![1, 2],
            global: Global::Bounded(10),
            schedule: Schedule::Fifo,
        });
        assert_eq!(clamped.global_capacity(), 3);
    }

    #[test_traced]
    fn test_lock_commit_unlock() {
        let connector = Connector::new(Config {
            capacities: vec![2, 2],
            global: Global::Bounded(3),
            schedule: Schedule::Fifo,
        });
        let connection = connector.connection(1);
        assert_eq!(connection.id(), 1);

        let mut token = connection.lock(Duration::ZERO).unwrap();
        assert_eq!(token.connection(), 1);
        assert!(!token.is_committed());
        connection.commit(&mut token, "a");
        assert!(token.is_committed());
        connection.unlock(Some(token));
        assert_eq!(connection.local_size(), 1);
        assert_eq!(connector.global_size(), 1);

        assert_eq!(connector.next_ready(Duration::ZERO), Some(1));
        assert_eq!(connector.next_ready(Duration::ZERO), None);
        assert_eq!(connection.poll(), Some("a"));
        assert_eq!(connection.poll(), None);
        assert_eq!(
            connection.stats(),
            Stats {
                committed: 1,
                delivered: 1
            }
        );
    }

    #[test]
    fn test_unlock_without_commit_rolls_back() {
        let connector = Connector::<u8>::new(Config {
            capacities: vec![1],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        let connection = connector.connection(0);
        let token = connection.lock(Duration::ZERO);
        assert!(token.is_some());
        assert!(connection.lock(Duration::ZERO).is_none());
        connection.unlock(token);
        assert_eq!(connection.local_size(), 0);
        assert_eq!(connector.next_ready(Duration::ZERO), None);

        // The sentinel is a no-op
        connection.unlock(None);
        assert!(connection.lock(Duration::ZERO).is_some());
    }

    #[test]
    fn test_bounded_global_shared() {
        let connector = Connector::new(Config {
            capacities: vec![2, 2],
            global: Global::Bounded(3),
            schedule: Schedule::Fifo,
        });
        commit(connector.connection(0), 1);
        commit(connector.connection(0), 2);
        commit(connector.connection(1), 3);
        assert!(connector.connection(1).lock(Duration::ZERO).is_none());
        assert_eq!(connector.global_size(), 3);
        assert_eq!(connector.connection(0).poll(), Some(1));
        commit(connector.connection(1), 4);
        assert_eq!(connector.connection(1).local_size(), 2);
    }

    #[test]
    #[should_panic(expected = "token issued by connection 0 used on connection 1")]
    fn test_foreign_token_panics() {
        let connector = Connector::new(Config {
            capacities: vec![1, 1],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        let mut token = connector.connection(0).lock(Duration::ZERO).unwrap();
        connector.connection(1).commit(&mut token, 1u8);
    }

    #[test]
    #[should_panic(expected = "token already committed on connection 0")]
    fn test_double_commit_panics() {
        let connector = Connector::new(Config {
            capacities: vec![2],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        let connection = connector.connection(0);
        let mut token = connection.lock(Duration::ZERO).unwrap();
        connection.commit(&mut token, 1u8);
        connection.commit(&mut token, 2u8);
    }

    #[test]
    #[should_panic(expected = "stale token for connection 0")]
    fn test_stale_token_panics() {
        let connector = Connector::new(Config {
            capacities: vec![2],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        let connection = connector.connection(0);
        let mut first = connection.lock(Duration::ZERO).unwrap();
        connection.commit(&mut first, 1u8);

        // The lock was released by the commit, so a new holder may take it
        let _second = connection.lock(Duration::ZERO).unwrap();
        connection.commit(&mut first, 2u8);
    }

    #[test_traced]
    fn test_close_rejects_lock_keeps_pending() {
        let connector = Connector::new(Config {
            capacities: vec![2, 2],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        commit(connector.connection(0), 1);
        connector.close();
        assert!(connector.is_closed());
        assert!(connector.connection(0).lock(Duration::ZERO).is_none());
        assert!(connector.connection(1).lock(Duration::ZERO).is_none());
        assert_eq!(connector.next_ready(Duration::ZERO), Some(0));
        assert_eq!(connector.connection(0).poll(), Some(1));
    }

    #[test]
    fn test_round_robin_serves_quiet_connection() {
        let connector = Connector::new(Config {
            capacities: vec![4, 4, 4, 4],
            global: Global::Independent,
            schedule: Schedule::RoundRobin,
        });
        for i in 0..3 {
            commit(connector.connection(1), i);
        }
        commit(connector.connection(3), 10);
        let mut served = Vec::new();
        while let Some(id) = connector.next_ready(Duration::ZERO) {
            served.push((id, connector.connection(id).poll().unwrap()));
        }
        assert_eq!(served, vec![(1, 0), (3, 10), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_next_ready_waits_for_commit() {
        let connector = Connector::new(Config {
            capacities: vec![1],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                commit(connector.connection(0), 9);
            });
            assert_eq!(connector.next_ready(Duration::from_secs(5)), Some(0));
        });
        assert_eq!(connector.connection(0).poll(), Some(9));
    }

    #[test]
    fn test_requeue_reports_connection_again() {
        let connector = Connector::new(Config {
            capacities: vec![2, 2],
            global: Global::Independent,
            schedule: Schedule::Fifo,
        });
        commit(connector.connection(1), 4);
        assert_eq!(connector.next_ready(Duration::ZERO), Some(1));
        assert_eq!(connector.next_ready(Duration::ZERO), None);

        connector.requeue(1);
        assert_eq!(connector.next_ready(Duration::ZERO), Some(1));
        assert_eq!(connector.connection(1).poll(), Some(4));
    }

    #[test_traced]
    fn test_concurrent_producers_consumers() {
        const PER_PRODUCER: u64 = 2_000;
        let connector = Arc::new(Connector::new(Config {
            capacities: vec![3, 5, 2],
            global: Global::Bounded(6),
            schedule: Schedule::RoundRobin,
        }));
        let done = AtomicBool::new(false);
        let received = parking_lot::Mutex::new(Vec::new());
        thread::scope(|s| {
            let producers: Vec<_> = (0..3)
                .map(|id| {
                    let connector = &connector;
                    s.spawn(move || {
                        let connection = connector.connection(id);
                        let mut sent = 0;
                        while sent < PER_PRODUCER {
                            let Some(mut token) = connection.lock(Duration::from_millis(1)) else {
                                continue;
                            };
                            connection.commit(&mut token, id as u64 * PER_PRODUCER + sent);
                            connection.unlock(Some(token));
                            sent += 1;
                            assert!(connector.global_size() <= connector.global_capacity());
                        }
                    })
                })
                .collect();
            for _ in 0..2 {
                s.spawn(|| loop {
                    match connector.next_ready(Duration::from_millis(1)) {
                        Some(id) => {
                            let payload = connector.connection(id).poll().unwrap();
                            received.lock().push(payload);
                        }
                        None if done.load(std::sync::atomic::Ordering::Acquire) => break,
                        None => {}
                    }
                });
            }
            for producer in producers {
                producer.join().unwrap();
            }
            done.store(true, std::sync::atomic::Ordering::Release);
        });
        let mut received = received.into_inner();
        received.sort_unstable();
        assert_eq!(received, (0..3 * PER_PRODUCER).collect::<Vec<_>>());
        assert_eq!(connector.global_size(), 0);
        for connection in connector.connections() {
            let stats = connection.stats();
            assert_eq!(stats.committed, PER_PRODUCER);
            assert_eq!(stats.delivered, PER_PRODUCER);
        }
    }
}
