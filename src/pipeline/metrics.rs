//! Gateway execution metrics
//!
//! Request counters and a request latency histogram, plus per-method call
//! statistics. Snapshots serialize to the `/metrics` endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Upper bounds of the latency buckets, microseconds; the last bucket is open
const BUCKET_BOUNDS_US: [u64; 7] = [1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

/// How a single call ended, as far as metrics care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    Timeout,
    /// Skipped because a predecessor failed
    Skipped,
}

#[derive(Debug)]
pub struct GatewayMetrics {
    total_requests: AtomicU64,
    /// Requests rejected before any call ran
    rejected_requests: AtomicU64,
    /// Requests in which at least one call failed
    partial_requests: AtomicU64,
    total_request_time_us: AtomicU64,
    total_calls: AtomicU64,
    method_metrics: RwLock<HashMap<String, MethodMetrics>>,
    /// Buckets: <1ms, <5ms, <10ms, <50ms, <100ms, <500ms, <1s, >1s
    latency_histogram: [AtomicU64; 8],
    start_time: Instant,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            partial_requests: AtomicU64::new(0),
            total_request_time_us: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            method_metrics: RwLock::new(HashMap::new()),
            latency_histogram: Default::default(),
            start_time: Instant::now(),
        }
    }

    /// Record a request that ran its call graph
    pub fn record_request(&self, duration: Duration, failed_calls: usize) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if failed_calls > 0 {
            self.partial_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(duration);
    }

    /// Record a request that failed verification
    pub fn record_rejection(&self, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(duration);
    }

    fn record_latency(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.total_request_time_us.fetch_add(us, Ordering::Relaxed);
        let bucket = BUCKET_BOUNDS_US
            .iter()
            .position(|bound| us < *bound)
            .unwrap_or(BUCKET_BOUNDS_US.len());
        self.latency_histogram[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call(&self, method: &str, duration: Duration, outcome: CallOutcome) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut metrics = self.method_metrics.write();
        metrics
            .entry(method.to_string())
            .or_insert_with(MethodMetrics::new)
            .record(duration, outcome);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn rejected_requests(&self) -> u64 {
        self.rejected_requests.load(Ordering::Relaxed)
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn average_request_time(&self) -> Duration {
        let total = self.total_requests();
        if total == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_request_time_us.load(Ordering::Relaxed) / total)
    }

    /// Request latency percentiles, resolved to bucket upper bounds
    pub fn latency_percentiles(&self) -> LatencyPercentiles {
        let buckets: Vec<u64> = self
            .latency_histogram
            .iter()
            .map(|a| a.load(Ordering::Relaxed))
            .collect();
        let total: u64 = buckets.iter().sum();
        if total == 0 {
            return LatencyPercentiles::default();
        }

        let bound_ms = |i: usize| {
            BUCKET_BOUNDS_US
                .get(i)
                .map_or(10_000.0, |us| *us as f64 / 1000.0)
        };
        let mut percentiles = LatencyPercentiles::default();
        let mut cumulative = 0u64;
        for (i, count) in buckets.iter().enumerate() {
            cumulative += count;
            let percentile = cumulative as f64 / total as f64 * 100.0;
            if percentiles.p50_ms == 0.0 && percentile >= 50.0 {
                percentiles.p50_ms = bound_ms(i);
            }
            if percentiles.p90_ms == 0.0 && percentile >= 90.0 {
                percentiles.p90_ms = bound_ms(i);
            }
            if percentiles.p99_ms == 0.0 && percentile >= 99.0 {
                percentiles.p99_ms = bound_ms(i);
            }
        }
        percentiles
    }

    pub fn method(&self, name: &str) -> Option<MethodMetricsSnapshot> {
        self.method_metrics.read().get(name).map(MethodMetrics::snapshot)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests(),
            rejected_requests: self.rejected_requests(),
            partial_requests: self.partial_requests.load(Ordering::Relaxed),
            total_calls: self.total_calls(),
            average_request_ms: self.average_request_time().as_secs_f64() * 1000.0,
            percentiles: self.latency_percentiles(),
            methods: self
                .method_metrics
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.snapshot()))
                .collect(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct MethodMetrics {
    calls: u64,
    failures: u64,
    timeouts: u64,
    skipped: u64,
    total_time_us: u64,
    max_time_us: u64,
}

impl MethodMetrics {
    fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, duration: Duration, outcome: CallOutcome) {
        let us = duration.as_micros() as u64;
        self.calls += 1;
        match outcome {
            CallOutcome::Success => {}
            CallOutcome::Failure => self.failures += 1,
            CallOutcome::Timeout => self.timeouts += 1,
            CallOutcome::Skipped => self.skipped += 1,
        }
        self.total_time_us += us;
        self.max_time_us = self.max_time_us.max(us);
    }

    fn snapshot(&self) -> MethodMetricsSnapshot {
        MethodMetricsSnapshot {
            calls: self.calls,
            failures: self.failures,
            timeouts: self.timeouts,
            skipped: self.skipped,
            average_ms: if self.calls > 0 {
                self.total_time_us as f64 / self.calls as f64 / 1000.0
            } else {
                0.0
            },
            max_ms: self.max_time_us as f64 / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodMetricsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub skipped: u64,
    pub average_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub partial_requests: u64,
    pub total_calls: u64,
    pub average_request_ms: f64,
    pub percentiles: LatencyPercentiles,
    pub methods: HashMap<String, MethodMetricsSnapshot>,
    pub uptime_secs: u64,
}
