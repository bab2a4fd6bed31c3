//! Lightweight metrics for the monitoring core
//!
//! In-memory counters covering the probe pass and monitor lifecycle, queried
//! by hosts for diagnostics or logged periodically.
//!
//! ## Design
//!
//! - Lock-free atomic counters for high-frequency operations
//! - DashMap for low-contention timing storage

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

/// Global metrics registry (singleton)
static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::new()));

/// Get the global metrics instance
pub fn metrics() -> &'static Arc<Metrics> {
    &METRICS
}

/// Metrics registry for probe and monitor activity
#[derive(Debug)]
pub struct Metrics {
    // Probe pass counters
    probes_run: AtomicU64,
    probe_failures: AtomicU64,
    probe_panics: AtomicU64,

    // Monitor lifecycle counters
    monitors_created: AtomicU64,
    monitors_retired: AtomicU64,

    // Watch activity counters
    checks_run: AtomicU64,
    external_edits_detected: AtomicU64,

    // Timings (operation name -> durations in microseconds)
    operation_timings: DashMap<String, Vec<u64>>,
}

/// Point-in-time copy of the counters, for logging and host diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub probes_run: u64,
    pub probe_failures: u64,
    pub probe_panics: u64,
    pub monitors_created: u64,
    pub monitors_retired: u64,
    pub checks_run: u64,
    pub external_edits_detected: u64,
}

/// Summary statistics for one timed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingStats {
    pub count: usize,
    pub mean_us: u64,
    pub max_us: u64,
}

impl Metrics {
    /// Creates a new metrics registry
    pub fn new() -> Self {
        Self {
            probes_run: AtomicU64::new(0),
            probe_failures: AtomicU64::new(0),
            probe_panics: AtomicU64::new(0),
            monitors_created: AtomicU64::new(0),
            monitors_retired: AtomicU64::new(0),
            checks_run: AtomicU64::new(0),
            external_edits_detected: AtomicU64::new(0),
            operation_timings: DashMap::new(),
        }
    }

    /// Records one detector probe
    pub fn record_probe(&self) {
        self.probes_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a probe that reported an error
    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a probe that panicked and was contained
    pub fn record_probe_panic(&self) {
        self.probe_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a monitor construction
    pub fn record_monitor_created(&self) {
        self.monitors_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a monitor retirement
    pub fn record_monitor_retired(&self) {
        self.monitors_retired.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one monitor check pass
    pub fn record_check(&self) {
        self.checks_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an external-edit transition reported to the consumer
    pub fn record_external_edit(&self) {
        self.external_edits_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the duration of a named operation
    pub fn record_timing(&self, operation: &str, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.operation_timings
            .entry(operation.to_string())
            .or_default()
            .push(micros);
    }

    /// Summary statistics for a named operation, if any samples exist
    pub fn timing_stats(&self, operation: &str) -> Option<TimingStats> {
        let samples = self.operation_timings.get(operation)?;
        if samples.is_empty() {
            return None;
        }
        let count = samples.len();
        let sum: u64 = samples.iter().sum();
        let max = samples.iter().copied().max().unwrap_or(0);
        Some(TimingStats {
            count,
            mean_us: sum / count as u64,
            max_us: max,
        })
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            probes_run: self.probes_run.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            probe_panics: self.probe_panics.load(Ordering::Relaxed),
            monitors_created: self.monitors_created.load(Ordering::Relaxed),
            monitors_retired: self.monitors_retired.load(Ordering::Relaxed),
            checks_run: self.checks_run.load(Ordering::Relaxed),
            external_edits_detected: self.external_edits_detected.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
