use crate::ready::Ready;
use sluice_queue::transactional::{Transaction, TransactionQueue, TransactionalMultiQueue};
use sluice_storage::slot_store::{Key, SlotStore};
use std::{
    ptr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::debug;

/// Cumulative counters for a [Connection].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Payloads committed by producers.
    pub committed: u64,
    /// Payloads removed by consumers.
    pub delivered: u64,
}

/// A single bounded destination within a [crate::Connector].
///
/// Producers call [Connection::lock], then [Connection::commit], then [Connection::unlock].
/// Payloads live in a [SlotStore] sized to the local capacity while only their keys travel
/// through the underlying transaction queue.
pub struct Connection<P> {
    id: usize,
    queues: Arc<TransactionalMultiQueue<Key>>,
    store: SlotStore<P>,
    ready: Arc<Ready>,
    generation: AtomicU64,
    closed: AtomicBool,
    committed: AtomicU64,
    delivered: AtomicU64,
}

impl<P> std::fmt::Debug for Connection<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("local_size", &self.local_size())
            .field("local_capacity", &self.local_capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<P> Connection<P> {
    pub(crate) fn new(
        id: usize,
        queues: Arc<TransactionalMultiQueue<Key>>,
        ready: Arc<Ready>,
    ) -> Self {
        let store = SlotStore::new(queues.queue(id).capacity());
        Self {
            id,
            queues,
            store,
            ready,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            committed: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    fn queue(&self) -> &TransactionQueue<Key> {
        self.queues.queue(self.id)
    }

    /// Position of this connection within its connector.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Payloads waiting in this connection.
    pub fn local_size(&self) -> usize {
        self.queue().len()
    }

    /// Maximum payloads this connection may hold (never larger than the global capacity).
    pub fn local_capacity(&self) -> usize {
        self.queue().capacity()
    }

    /// Acquire the right to enqueue one payload, waiting at most `timeout`.
    ///
    /// Returns `None` if the connection is closed, another producer holds the lock, or no
    /// capacity became available in time. A failed lock leaves the connection unchanged.
    pub fn lock(&self, timeout: Duration) -> Option<Token<'_, P>> {
        if self.is_closed() {
            return None;
        }
        let transaction = self.queue().begin(timeout)?;

        // Only the lock holder reaches this point, so the increment is uncontended
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Some(Token {
            connection: self,
            generation,
            transaction: Some(transaction),
        })
    }

    /// Enqueue `payload` under a held `token` and publish this connection as ready.
    ///
    /// The token remains valid for [Connection::unlock] but cannot commit again.
    ///
    /// # Panics
    ///
    /// Panics if `token` was issued by another connection, belongs to an earlier lock, or has
    /// already been committed.
    pub fn commit(&self, token: &mut Token<'_, P>, payload: P) {
        assert!(
            ptr::eq(token.connection, self),
            "token issued by connection {} used on connection {}",
            token.connection.id,
            self.id
        );
        assert_eq!(
            token.generation,
            self.generation.load(Ordering::Acquire),
            "stale token for connection {}",
            self.id
        );
        let transaction = token
            .transaction
            .take()
            .unwrap_or_else(|| panic!("token already committed on connection {}", self.id));

        // The store has one key per local permit and this transaction holds a permit
        let Ok(key) = self.store.set(payload) else {
            panic!("slot store sized to local capacity");
        };
        transaction.commit(key);
        self.committed.fetch_add(1, Ordering::Relaxed);
        self.ready.notify(self.id);
    }

    /// Release a lock obtained from [Connection::lock].
    ///
    /// If the token was never committed, the reservation is rolled back. Passing `None` (a
    /// failed lock) does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `token` was issued by another connection.
    pub fn unlock(&self, token: Option<Token<'_, P>>) {
        let Some(token) = token else {
            return;
        };
        assert!(
            ptr::eq(token.connection, self),
            "token issued by connection {} unlocked on connection {}",
            token.connection.id,
            self.id
        );
        drop(token);
    }

    /// Remove the next payload, if any.
    pub fn poll(&self) -> Option<P> {
        // Permits return to producers only after the key is redeemed
        let payload = self.queue().poll_with(|key| self.store.get(key))?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Some(payload)
    }

    /// Reject all further [Connection::lock] calls. Payloads already committed remain
    /// deliverable through [Connection::poll].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(id = self.id, pending = self.local_size(), "connection closed");
        }
    }

    /// Returns true once [Connection::close] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Payloads committed and delivered so far.
    pub fn stats(&self) -> Stats {
        Stats {
            committed: self.committed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive right to enqueue one payload on a [Connection].
///
/// Dropping the token unlocks the connection, rolling back the reservation if it was not
/// committed.
#[must_use = "dropping a token unlocks the connection"]
pub struct Token<'a, P> {
    connection: &'a Connection<P>,
    generation: u64,
    transaction: Option<Transaction<'a, Key>>,
}

impl<P> Token<'_, P> {
    /// Id of the connection that issued this token.
    pub fn connection(&self) -> usize {
        self.connection.id
    }

    /// Returns true once a payload has been committed under this token.
    pub fn is_committed(&self) -> bool {
        self.transaction.is_none()
    }
}

impl<P> std::fmt::Debug for Token<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("connection", &self.connection.id)
            .field("generation", &self.generation)
            .field("committed", &self.is_committed())
            .finish()
    }
}
