//! Call-level metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives call-level counters and timers.
///
/// Every method defaults to a no-op so implementations pick what they need.
pub trait Metrics: Send + Sync {
    /// A call started.
    fn call_started(&self) {}

    /// An attempt after the first one started.
    fn retry_started(&self) {}

    /// A retry attempt failed before producing a response.
    fn retry_failed(&self) {}

    /// A call ended with a response.
    fn call_succeeded(&self) {}

    /// A call ended with an error.
    fn call_failed(&self) {}

    /// Duration of a whole call.
    fn observe_call(&self, _elapsed: Duration) {}

    /// Duration of a single retry attempt.
    fn observe_retry(&self, _elapsed: Duration) {}
}

/// Metrics sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

/// Point-in-time copy of [`AtomicMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Calls started.
    pub calls: u64,
    /// Retry attempts started.
    pub retries: u64,
    /// Retry attempts that failed without a response.
    pub retry_failures: u64,
    /// Calls that ended with a response.
    pub successes: u64,
    /// Calls that ended with an error.
    pub failures: u64,
    /// Total time spent in calls.
    pub call_time: Duration,
    /// Total time spent in retry attempts.
    pub retry_time: Duration,
}

/// In-memory metrics backed by atomic counters.
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct AtomicMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    retries: AtomicU64,
    retry_failures: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    call_nanos: AtomicU64,
    retry_nanos: AtomicU64,
}

impl AtomicMetrics {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.inner;
        MetricsSnapshot {
            calls: c.calls.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            retry_failures: c.retry_failures.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            call_time: Duration::from_nanos(c.call_nanos.load(Ordering::Relaxed)),
            retry_time: Duration::from_nanos(c.retry_nanos.load(Ordering::Relaxed)),
        }
    }
}

fn add_nanos(counter: &AtomicU64, elapsed: Duration) {
    let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    counter.fetch_add(nanos, Ordering::Relaxed);
}

impl Metrics for AtomicMetrics {
    fn call_started(&self) {
        self.inner.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn retry_started(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn retry_failed(&self) {
        self.inner.retry_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn call_succeeded(&self) {
        self.inner.successes.fetch_add(1, Ordering::Relaxed);
    }

    fn call_failed(&self) {
        self.inner.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn observe_call(&self, elapsed: Duration) {
        add_nanos(&self.inner.call_nanos, elapsed);
    }

    fn observe_retry(&self, elapsed: Duration) {
        add_nanos(&self.inner.retry_nanos, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot() {
        let metrics = AtomicMetrics::new();
        let shared = metrics.clone();

        shared.call_started();
        shared.retry_started();
        shared.retry_failed();
        shared.call_failed();
        shared.observe_call(Duration::from_millis(30));
        shared.observe_retry(Duration::from_millis(10));

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                calls: 1,
                retries: 1,
                retry_failures: 1,
                successes: 0,
                failures: 1,
                call_time: Duration::from_millis(30),
                retry_time: Duration::from_millis(10),
            }
        );
    }

    #[test]
    fn test_noop() {
        let metrics = NoopMetrics;
        metrics.call_started();
        metrics.observe_call(Duration::from_secs(1));
    }
}
