use crate::{ready::Ready, Config, Connection, Global, Schedule};
use sluice_queue::transactional::TransactionalMultiQueue;
use sluice_storage::slot_store::Key;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// An ordered set of [Connection]s sharing one global capacity and one readiness schedule.
///
/// Connection ids are positions in [Connector::connections] and are stable for the lifetime
/// of the connector.
pub struct Connector<P> {
    queues: Arc<TransactionalMultiQueue<Key>>,
    connections: Vec<Connection<P>>,
    ready: Arc<Ready>,
    schedule: Schedule,
    capacity: usize,
}

impl<P> std::fmt::Debug for Connector<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("schedule", &self.schedule)
            .field("global_size", &self.global_size())
            .field("global_capacity", &self.capacity)
            .field("connections", &self.connections)
            .finish()
    }
}

impl<P> Connector<P> {
    /// Build one connection per entry of `cfg.capacities`.
    ///
    /// # Panics
    ///
    /// Panics if there are no connections, any capacity is zero, or a bounded global capacity
    /// is zero.
    pub fn new(cfg: Config) -> Self {
        assert!(!cfg.capacities.is_empty(), "at least one connection is required");
        let locals = &cfg.capacities;
        let (permits, capacity) = match cfg.global {
            Global::Independent => {
                let sum = locals.iter().sum();
                (sum, sum)
            }
            Global::Bounded(global) => {
                assert!(global > 0, "global capacity must be non-zero");

                // No connection can hold more than `global`, so the reachable bound may be lower
                let reachable: usize = locals.iter().map(|local| (*local).min(global)).sum();
                (global, global.min(reachable))
            }
        };
        let queues = Arc::new(TransactionalMultiQueue::new(permits, locals));
        let ready = Arc::new(Ready::new(cfg.schedule, locals.len()));
        let connections = (0..locals.len())
            .map(|id| Connection::new(id, queues.clone(), ready.clone()))
            .collect();
        debug!(
            connections = locals.len(),
            global_capacity = capacity,
            schedule = ?cfg.schedule,
            "connector created"
        );
        Self {
            queues,
            connections,
            ready,
            schedule: cfg.schedule,
            capacity,
        }
    }

    /// Every connection, ordered by id.
    pub fn connections(&self) -> &[Connection<P>] {
        &self.connections
    }

    /// The connection with the given `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn connection(&self, id: usize) -> &Connection<P> {
        &self.connections[id]
    }

    /// Payloads waiting across every connection.
    pub fn global_size(&self) -> usize {
        self.queues.len()
    }

    /// Maximum payloads the connections can hold together.
    pub fn global_capacity(&self) -> usize {
        self.capacity
    }

    /// The readiness schedule used by [Connector::next_ready].
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Wait at most `timeout` for the id of a connection with a committed payload.
    ///
    /// Each commit is reported once. A reported connection may already be empty if its
    /// payload was removed with [Connection::poll] without first being reported here.
    pub fn next_ready(&self, timeout: Duration) -> Option<usize> {
        self.ready.next(timeout)
    }

    /// Report connection `id` as ready again.
    ///
    /// Use this to hand back a notification taken from [Connector::next_ready] whose payload
    /// was not polled.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn requeue(&self, id: usize) {
        assert!(id < self.connections.len(), "unknown connection {id}");
        self.ready.notify(id);
    }

    /// Close every connection.
    pub fn close(&self) {
        for connection in &self.connections {
            connection.close();
        }
    }

    /// Returns true if every connection is closed.
    pub fn is_closed(&self) -> bool {
        self.connections.iter().all(Connection::is_closed)
    }
}
