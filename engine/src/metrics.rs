//! Metrics for [crate::Engine].

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Metrics for [crate::Engine].
#[derive(Default)]
pub struct Metrics {
    /// Payloads handed to consumers.
    pub delivered: Counter,
    /// Consumer failures (errors and panics).
    pub failed: Counter,
    /// Live worker threads.
    pub workers: Gauge,
}

impl Metrics {
    /// Create and register metrics with the given registry.
    ///
    /// Pass a sub-registry to prefix metric names.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "delivered",
            "Payloads handed to consumers",
            metrics.delivered.clone(),
        );
        registry.register("failed", "Consumer failures", metrics.failed.clone());
        registry.register("workers", "Live worker threads", metrics.workers.clone());
        metrics
    }
}
