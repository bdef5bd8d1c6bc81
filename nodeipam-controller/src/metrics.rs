use std::sync::{LazyLock, PoisonError, RwLock};

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{counter::Counter, family::Family, histogram::Histogram};
use prometheus_client::registry::{Registry, Unit};
use tokio::time::Instant;

use crate::Error;

pub static REGISTRY: LazyLock<RwLock<Registry>> =
    LazyLock::new(|| RwLock::new(Registry::with_prefix("nodeipam")));

#[derive(Clone)]
pub struct AllocatorMetrics {
    pub runs: Counter,
    pub failures: Family<ErrorLabels, Counter>,
    pub retries: Counter,
    pub dropped: Counter,
    pub duration: Histogram,
}

impl Default for AllocatorMetrics {
    fn default() -> Self {
        Self {
            runs: Counter::default(),
            failures: Family::default(),
            retries: Counter::default(),
            dropped: Counter::default(),
            duration: Histogram::new([0.01, 0.1, 0.25, 0.5, 1.0, 5.0, 15.0, 60.0].into_iter()),
        }
    }
}

impl AllocatorMetrics {
    /// Register allocator metrics in the global registry to start exporting them.
    pub fn register(self) -> Self {
        let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        registry.register_with_unit(
            "allocation_duration",
            "cidr allocation duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        registry.register(
            "allocation_failures",
            "Number of failed cidr allocations",
            self.failures.clone(),
        );
        registry.register(
            "allocation_runs",
            "Number of cidr allocations",
            self.runs.clone(),
        );
        registry.register(
            "allocation_retries",
            "Number of cidr allocations scheduled for retry",
            self.retries.clone(),
        );
        registry.register(
            "allocation_dropped",
            "Number of nodes dropped after exhausting retries",
            self.dropped.clone(),
        );
        self
    }

    pub fn count_failure(&self, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                error: e.metric_label().to_owned(),
            })
            .inc();
    }

    pub fn count_and_measure(&self) -> AllocationMeasurer {
        self.runs.inc();
        AllocationMeasurer {
            start: Instant::now(),
            metric: self.duration.clone(),
        }
    }
}

pub struct AllocationMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for AllocationMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub error: String,
}
