use crate::{metrics::Metrics, Consumer, Failure, Threads};
use parking_lot::Mutex;
use sluice_connector::Connector;
use sluice_utils::{extract_panic_message, Semaphore};
use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, error, trace, warn};

/// Whether a worker outlives idleness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    /// Runs until the engine stops.
    Permanent,
    /// Exits after `keep_alive` without work.
    Elastic,
}

/// State shared by a [crate::Handle] and every worker.
#[derive(Default)]
pub(crate) struct Control {
    pub(crate) stop: AtomicBool,
    pub(crate) handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Control {
    pub(crate) fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Everything a worker needs to drain a connector.
pub(crate) struct Shared<P> {
    pub(crate) control: Arc<Control>,
    pub(crate) connector: Arc<Connector<P>>,
    pub(crate) consumers: Vec<Box<dyn Consumer<P>>>,
    pub(crate) limits: Vec<Semaphore>,
    pub(crate) poll_interval: Duration,
    pub(crate) threads: Threads,
    pub(crate) metrics: Metrics,
    pub(crate) live: AtomicUsize,
    pub(crate) idle: AtomicUsize,
    pub(crate) next_index: AtomicUsize,
}

impl<P: Send + 'static> Shared<P> {
    /// Start a worker of the given `kind`.
    ///
    /// Returns `Ok(false)` without spawning if the engine is stopping or, for an elastic
    /// worker, the pool is already at its maximum size.
    pub(crate) fn spawn(self: &Arc<Self>, kind: Kind) -> Result<bool, io::Error> {
        let mut handles = self.control.handles.lock();
        if self.control.stopped() {
            return Ok(false);
        }
        match kind {
            Kind::Permanent => {
                self.live.fetch_add(1, Ordering::AcqRel);
            }
            Kind::Elastic => {
                let max = self.threads.max;
                let reserved = self
                    .live
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                        (live < max).then_some(live + 1)
                    });
                if reserved.is_err() {
                    return Ok(false);
                }
            }
        }
        self.idle.fetch_add(1, Ordering::AcqRel);
        self.metrics.workers.inc();

        // Forget workers that already exited
        handles.retain(|handle| !handle.is_finished());
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let builder = (self.threads.factory)(index);
        let worker = self.clone();
        match builder.spawn(move || worker.run(index, kind)) {
            Ok(handle) => {
                handles.push(handle);
                Ok(true)
            }
            Err(err) => {
                self.exited();
                Err(err)
            }
        }
    }

    fn exited(&self) {
        self.idle.fetch_sub(1, Ordering::AcqRel);
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.metrics.workers.dec();
    }

    /// Wait for ready connections and deliver their payloads until stopped (or, for an
    /// elastic worker, until idle for `keep_alive`).
    fn run(self: Arc<Self>, index: usize, kind: Kind) {
        debug!(worker = index, ?kind, "worker started");
        let mut idle_since = Instant::now();
        while !self.control.stopped() {
            let Some(id) = self.connector.next_ready(self.poll_interval) else {
                if kind == Kind::Elastic && idle_since.elapsed() >= self.threads.keep_alive {
                    break;
                }
                continue;
            };

            // Every live worker is now busy: grow the pool if allowed
            if self.idle.fetch_sub(1, Ordering::AcqRel) == 1 {
                if let Err(err) = self.spawn(Kind::Elastic) {
                    warn!(worker = index, ?err, "failed to spawn elastic worker");
                }
            }
            self.deliver(id);
            self.idle.fetch_add(1, Ordering::AcqRel);
            idle_since = Instant::now();
        }
        self.exited();
        debug!(worker = index, ?kind, "worker stopped");
    }

    /// Remove one payload from connection `id` and run its consumer, isolating failures.
    fn deliver(&self, id: usize) {
        let limit = &self.limits[id];
        while !limit.acquire(self.poll_interval) {
            if self.control.stopped() {
                // Leave the payload reachable through next_ready
                self.connector.requeue(id);
                trace!(id, "stopped before delivery");
                return;
            }
        }
        let Some(payload) = self.connector.connection(id).poll() else {
            trace!(id, "ready connection already drained");
            limit.release();
            return;
        };
        self.metrics.delivered.inc();
        let consumer = &self.consumers[id];
        let failure = match catch_unwind(AssertUnwindSafe(|| consumer.accept(payload))) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Failure::Error(err)),
            Err(err) => Some(Failure::Panic(extract_panic_message(&*err))),
        };
        if let Some(failure) = failure {
            self.metrics.failed.inc();
            warn!(id, %failure, "consumer failed");
            if let Err(err) = catch_unwind(AssertUnwindSafe(|| consumer.handle(failure))) {
                let err = extract_panic_message(&*err);
                error!(id, ?err, "consumer failure handler panicked");
            }
        }
        limit.release();
    }
}
