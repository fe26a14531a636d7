//! Drain connectors into consumers on worker threads.
//!
//! An [Engine] maps each connection of a [sluice_connector::Connector] to one [Consumer]. Every
//! worker repeats the same loop: wait (at most `poll_interval`) for a ready connection, remove
//! its payload, and hand it to the connection's consumer. Between waits the worker checks the
//! stop flag, so [Handle::stop] takes effect within one poll interval.
//!
//! Two shapes are available:
//!
//! - [Engine::dedicated]: exactly one worker thread; every consumer must declare a concurrency
//!   limit of 1.
//! - [Engine::threaded]: `permanent` workers start eagerly. When every live worker is busy, an
//!   elastic worker is added (up to `max`); elastic workers exit after `keep_alive` without
//!   work. Each consumer is invoked by at most [Consumer::concurrent_limit] workers at once.
//!   The connector must use [sluice_connector::Schedule::RoundRobin] so that no connection is
//!   skipped indefinitely when there are fewer workers than connections.
//!
//! # Failures
//!
//! A consumer that returns an error or panics never takes down its worker. The failure is
//! routed to the same consumer's [Consumer::handle]. If the handler itself panics, the failure
//! is logged at `error` level and the loop continues.
//!
//! # Example
//!
//! ```rust
//! use prometheus_client::registry::Registry;
//! use sluice_connector::{Config as ConnectorConfig, Connector, Global, Schedule};
//! use sluice_engine::{BoxError, Config, Consumer, Engine, Failure};
//! use std::{
//!     sync::{mpsc, Arc},
//!     time::Duration,
//! };
//!
//! struct Forward(parking_lot::Mutex<mpsc::Sender<u64>>);
//!
//! impl Consumer<u64> for Forward {
//!     fn accept(&self, payload: u64) -> Result<(), BoxError> {
//!         self.0.lock().send(payload)?;
//!         Ok(())
//!     }
//!
//!     fn handle(&self, _: Failure) {}
//! }
//!
//! let connector = Arc::new(Connector::new(ConnectorConfig {
//!     capacities: vec![4],
//!     global: Global::Independent,
//!     schedule: Schedule::Fifo,
//! }));
//! let (tx, rx) = mpsc::channel();
//! let mut registry = Registry::default();
//! let engine = Engine::dedicated(
//!     &mut registry,
//!     Config::default(),
//!     connector.clone(),
//!     vec![Box::new(Forward(parking_lot::Mutex::new(tx)))],
//! )
//! .unwrap();
//! let handle = engine.start().unwrap();
//!
//! let connection = connector.connection(0);
//! let mut token = connection.lock(Duration::ZERO).unwrap();
//! connection.commit(&mut token, 42);
//! connection.unlock(Some(token));
//!
//! assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
//! handle.stop();
//! ```

use std::{fmt, sync::Arc, thread, time::Duration};
use thiserror::Error;

mod engine;
pub use engine::{Engine, Handle, Shape};
mod metrics;
pub use metrics::Metrics;
mod worker;

/// An error returned by [Consumer::accept].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Builds the [thread::Builder] for the worker with the given index.
pub type Factory = Arc<dyn Fn(usize) -> thread::Builder + Send + Sync>;

/// Receives the payloads of one connection.
pub trait Consumer<P>: Send + Sync + 'static {
    /// Process one payload.
    fn accept(&self, payload: P) -> Result<(), BoxError>;

    /// Called with the failure of a previous [Consumer::accept].
    fn handle(&self, failure: Failure);

    /// Maximum number of workers that may run [Consumer::accept] at once.
    fn concurrent_limit(&self) -> usize {
        1
    }
}

impl<P, C: Consumer<P>> Consumer<P> for Arc<C> {
    fn accept(&self, payload: P) -> Result<(), BoxError> {
        (**self).accept(payload)
    }

    fn handle(&self, failure: Failure) {
        (**self).handle(failure)
    }

    fn concurrent_limit(&self) -> usize {
        (**self).concurrent_limit()
    }
}

/// Why a [Consumer] did not process a payload.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("consumer error: {0}")]
    Error(BoxError),
    #[error("consumer panicked: {0}")]
    Panic(String),
}

/// Errors that can occur when creating or starting an [Engine].
#[derive(Debug, Error)]
pub enum Error {
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("consumer count mismatch: {connections} connections, {consumers} consumers")]
    ConsumerCount {
        connections: usize,
        consumers: usize,
    },
    #[error("consumer {0} declares a concurrency limit of 0")]
    ZeroLimit(usize),
    #[error("dedicated engine requires concurrency limit 1 (consumer {id} declares {limit})")]
    DedicatedLimit { id: usize, limit: usize },
    #[error("at least one permanent thread is required")]
    NoPermanentThreads,
    #[error("max threads ({max}) below permanent threads ({permanent})")]
    MaxBelowPermanent { permanent: usize, max: usize },
    #[error("threaded engine requires a round-robin connector")]
    UnfairSchedule,
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Thread provisioning for an [Engine].
#[derive(Clone)]
pub struct Threads {
    /// Workers started eagerly that run until the engine stops.
    pub permanent: usize,

    /// Upper bound on live workers, including elastic ones.
    pub max: usize,

    /// How long an elastic worker waits without work before exiting.
    pub keep_alive: Duration,

    /// Creates the builder for each worker thread.
    pub factory: Factory,
}

impl Threads {
    /// A pool of exactly `n` permanent workers.
    pub fn fixed(n: usize) -> Self {
        Self {
            permanent: n,
            max: n,
            ..Self::default()
        }
    }
}

impl Default for Threads {
    fn default() -> Self {
        Self {
            permanent: 1,
            max: 1,
            keep_alive: Duration::from_secs(60),
            factory: Arc::new(|index| {
                thread::Builder::new().name(format!("sluice-worker-{index}"))
            }),
        }
    }
}

impl fmt::Debug for Threads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Threads")
            .field("permanent", &self.permanent)
            .field("max", &self.max)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

/// Configuration for an [Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// Longest a worker waits for a ready connection before re-checking the stop flag.
    pub poll_interval: Duration,

    /// Worker provisioning.
    pub threads: Threads,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            threads: Threads::default(),
        }
    }
}
