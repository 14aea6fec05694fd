//! Consumer metrics collection

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters describing what the consumer did with its deliveries
#[derive(Debug)]
pub struct ConsumerMetrics {
    received: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
    decode_failures: AtomicU64,
    plots_not_found: AtomicU64,
    store_failures: AtomicU64,
    unexpected_failures: AtomicU64,
    channel_errors: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of [`ConsumerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Deliveries taken from the queue
    pub received: u64,
    /// Deliveries acknowledged (success or discarded)
    pub acked: u64,
    /// Deliveries handed back for another attempt
    pub requeued: u64,
    /// Deliveries routed to the dead-letter queue
    pub dead_lettered: u64,
    /// Payloads that could not be decoded
    pub decode_failures: u64,
    /// Events for plots that do not exist
    pub plots_not_found: u64,
    /// Plot store failures and timeouts
    pub store_failures: u64,
    /// Panics and other unexpected failures
    pub unexpected_failures: u64,
    /// Errors receiving from the broker
    pub channel_errors: u64,
}

impl ConsumerMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            plots_not_found: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            unexpected_failures: AtomicU64::new(0),
            channel_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a delivery taken from the queue
    pub fn increment_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an ack
    pub fn increment_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a requeue
    pub fn increment_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dead-letter
    pub fn increment_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broker receive error
    pub fn increment_channel_errors(&self) {
        self.channel_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processing failure by its kind label
    pub fn record_failure(&self, kind: &str) {
        let counter = match kind {
            "decode" => &self.decode_failures,
            "not_found" => &self.plots_not_found,
            "store" => &self.store_failures,
            _ => &self.unexpected_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Deliveries settled per second since start
    pub fn settled_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        let snapshot = self.snapshot();
        (snapshot.acked + snapshot.requeued + snapshot.dead_lettered) as f64 / elapsed
    }

    /// Copy all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            plots_not_found: self.plots_not_found.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            unexpected_failures: self.unexpected_failures.load(Ordering::Relaxed),
            channel_errors: self.channel_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds_land_in_their_counter() {
        let metrics = ConsumerMetrics::new();
        metrics.record_failure("decode");
        metrics.record_failure("not_found");
        metrics.record_failure("store");
        metrics.record_failure("store");
        metrics.record_failure("unexpected");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.plots_not_found, 1);
        assert_eq!(snapshot.store_failures, 2);
        assert_eq!(snapshot.unexpected_failures, 1);
    }
}
