//! Atomic host metrics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bucket_bounds: Vec<f64>) -> Self {
        let buckets = (0..=bucket_bounds.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            buckets,
            bucket_bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Buckets in milliseconds, sized for hook-bound lifecycle transitions.
    pub fn transition_latency() -> Self {
        Self::new(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0])
    }

    pub fn observe(&self, value: f64) {
        let idx = self
            .bucket_bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bucket_bounds.len());

        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        // stored scaled by 1000 to keep sub-millisecond precision
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// Counters for everything the host does to plugins.
#[derive(Debug)]
pub struct HostMetrics {
    pub loads: Counter,
    pub load_failures: Counter,
    pub unloads: Counter,
    pub unload_failures: Counter,
    pub reloads: Counter,
    pub access_denials: Counter,
    pub events_emitted: Counter,
    pub loaded_plugins: Gauge,
    pub transition_latency_ms: Histogram,
}

impl HostMetrics {
    pub fn new() -> Self {
        Self {
            loads: Counter::new(),
            load_failures: Counter::new(),
            unloads: Counter::new(),
            unload_failures: Counter::new(),
            reloads: Counter::new(),
            access_denials: Counter::new(),
            events_emitted: Counter::new(),
            loaded_plugins: Gauge::new(),
            transition_latency_ms: Histogram::transition_latency(),
        }
    }

    pub fn record_load(&self, success: bool, latency_ms: f64) {
        self.transition_latency_ms.observe(latency_ms);
        if success {
            self.loads.inc();
            self.loaded_plugins.inc();
        } else {
            self.load_failures.inc();
        }
    }

    /// A plugin left the registry; `success` is whether its cleanup hook
    /// succeeded.
    pub fn record_unload(&self, success: bool, latency_ms: f64) {
        self.transition_latency_ms.observe(latency_ms);
        self.loaded_plugins.dec();
        if success {
            self.unloads.inc();
        } else {
            self.unload_failures.inc();
        }
    }

    pub fn record_denial(&self) {
        self.access_denials.inc();
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_metrics(self)
    }
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of [`HostMetrics`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MetricsSummary {
    pub loads: u64,
    pub load_failures: u64,
    pub unloads: u64,
    pub unload_failures: u64,
    pub reloads: u64,
    pub access_denials: u64,
    pub events_emitted: u64,
    pub loaded_plugins: i64,
    pub avg_transition_ms: f64,
}

impl MetricsSummary {
    pub fn from_metrics(metrics: &HostMetrics) -> Self {
        let count = metrics.transition_latency_ms.count();
        let avg = if count > 0 {
            metrics.transition_latency_ms.sum_ms() / count as f64
        } else {
            0.0
        };

        Self {
            loads: metrics.loads.get(),
            load_failures: metrics.load_failures.get(),
            unloads: metrics.unloads.get(),
            unload_failures: metrics.unload_failures.get(),
            reloads: metrics.reloads.get(),
            access_denials: metrics.access_denials.get(),
            events_emitted: metrics.events_emitted.get(),
            loaded_plugins: metrics.loaded_plugins.get(),
            avg_transition_ms: avg,
        }
    }
}
