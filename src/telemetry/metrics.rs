//! Metrics collection for echo engine statistics.
//!
//! Thread-safe counters shared by all sessions in a process.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Global metrics registry for the echo engine.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Number of echo requests transmitted.
    pub echo_requests_sent: Counter,
    /// Number of inbound datagrams matched to an outstanding request.
    pub replies_matched: Counter,
    /// Number of inbound datagrams discarded as unrelated traffic.
    pub packets_ignored: Counter,
    /// Number of send-time failures.
    pub send_errors: Counter,
    /// Number of calls that expired with no matching reply.
    pub timeouts: Counter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        vec![
            ("echo_requests_sent".into(), self.echo_requests_sent.get()),
            ("replies_matched".into(), self.replies_matched.get()),
            ("packets_ignored".into(), self.packets_ignored.get()),
            ("send_errors".into(), self.send_errors.get()),
            ("timeouts".into(), self.timeouts.get()),
        ]
    }
}
