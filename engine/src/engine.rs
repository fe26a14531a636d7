use crate::{
    metrics::Metrics,
    worker::{Control, Kind, Shared},
    Config, Consumer, Error,
};
use prometheus_client::registry::Registry;
use sluice_connector::{Connector, Schedule};
use sluice_utils::Semaphore;
use std::sync::{atomic::AtomicUsize, Arc};
use tracing::{debug, error};

/// How an [Engine] provisions worker threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// One worker thread. Every consumer must declare a concurrency limit of 1.
    Dedicated,
    /// A pool of `permanent` workers, growing to `max` under load.
    Threaded,
}

/// Drains a [Connector] into one [Consumer] per connection.
pub struct Engine<P> {
    shape: Shape,
    shared: Arc<Shared<P>>,
}

impl<P: Send + 'static> Engine<P> {
    /// Create an engine that drains `connector` on a single worker thread.
    ///
    /// `consumers[i]` receives the payloads of connection `i`. Only `poll_interval` and the
    /// thread factory of `cfg` are used.
    pub fn dedicated(
        registry: &mut Registry,
        mut cfg: Config,
        connector: Arc<Connector<P>>,
        consumers: Vec<Box<dyn Consumer<P>>>,
    ) -> Result<Self, Error> {
        for (id, consumer) in consumers.iter().enumerate() {
            let limit = consumer.concurrent_limit();
            if limit != 1 {
                return Err(Error::DedicatedLimit { id, limit });
            }
        }
        cfg.threads.permanent = 1;
        cfg.threads.max = 1;
        Self::new(Shape::Dedicated, registry, cfg, connector, consumers)
    }

    /// Create an engine that drains `connector` on a pool of worker threads.
    ///
    /// `consumers[i]` receives the payloads of connection `i` and is never invoked by more
    /// than its declared concurrency limit of workers at once. `connector` must be built with
    /// [Schedule::RoundRobin].
    pub fn threaded(
        registry: &mut Registry,
        cfg: Config,
        connector: Arc<Connector<P>>,
        consumers: Vec<Box<dyn Consumer<P>>>,
    ) -> Result<Self, Error> {
        if cfg.threads.permanent == 0 {
            return Err(Error::NoPermanentThreads);
        }
        if cfg.threads.max < cfg.threads.permanent {
            return Err(Error::MaxBelowPermanent {
                permanent: cfg.threads.permanent,
                max: cfg.threads.max,
            });
        }
        if connector.schedule() != Schedule::RoundRobin {
            return Err(Error::UnfairSchedule);
        }
        Self::new(Shape::Threaded, registry, cfg, connector, consumers)
    }

    fn new(
        shape: Shape,
        registry: &mut Registry,
        cfg: Config,
        connector: Arc<Connector<P>>,
        consumers: Vec<Box<dyn Consumer<P>>>,
    ) -> Result<Self, Error> {
        if cfg.poll_interval.is_zero() {
            return Err(Error::ZeroPollInterval);
        }
        let connections = connector.connections().len();
        if consumers.len() != connections {
            return Err(Error::ConsumerCount {
                connections,
                consumers: consumers.len(),
            });
        }
        let mut limits = Vec::with_capacity(consumers.len());
        for (id, consumer) in consumers.iter().enumerate() {
            let limit = consumer.concurrent_limit();
            if limit == 0 {
                return Err(Error::ZeroLimit(id));
            }
            limits.push(Semaphore::new(limit));
        }
        let shared = Arc::new(Shared {
            control: Arc::new(Control::default()),
            connector,
            consumers,
            limits,
            poll_interval: cfg.poll_interval,
            threads: cfg.threads,
            metrics: Metrics::init(registry),
            live: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            next_index: AtomicUsize::new(0),
        });
        Ok(Self { shape, shared })
    }

    /// How this engine provisions workers.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Start the permanent workers.
    ///
    /// If a worker cannot be spawned, the workers already started are stopped and joined.
    pub fn start(self) -> Result<Handle, Error> {
        let handle = Handle {
            control: self.shared.control.clone(),
        };
        for _ in 0..self.shared.threads.permanent {
            if let Err(err) = self.shared.spawn(Kind::Permanent) {
                error!(?err, "failed to spawn worker");
                handle.stop();
                return Err(Error::Spawn(err));
            }
        }
        debug!(
            shape = ?self.shape,
            permanent = self.shared.threads.permanent,
            max = self.shared.threads.max,
            "engine started"
        );
        Ok(handle)
    }
}

/// Controls a running [Engine].
///
/// Dropping the handle signals the workers to stop without waiting for them.
pub struct Handle {
    control: Arc<Control>,
}

impl Handle {
    /// Signal every worker to stop and wait for all of them to exit.
    ///
    /// Workers notice the signal within one poll interval. Payloads still queued stay in their
    /// connections.
    pub fn stop(self) {
        self.signal();
        loop {
            let handles = std::mem::take(&mut *self.control.handles.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.join() {
                    let err = sluice_utils::extract_panic_message(&*err);
                    error!(?err, "worker panicked");
                }
            }
        }
        debug!("engine stopped");
    }

    /// Returns true once a stop has been signalled.
    pub fn is_stopped(&self) -> bool {
        self.control.stopped()
    }

    fn signal(&self) {
        self.control
            .stop
            .store(true, std::sync::atomic::Ordering::Release);
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.signal();
    }
}
