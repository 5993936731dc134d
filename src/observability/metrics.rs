//! Delegation metrics.
//!
//! Atomic counters for the engine as a whole plus a `DashMap` of per-target
//! counts, so concurrent delegations never contend on one lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

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

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
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

/// Fixed-bucket latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    sum_micros: AtomicU64,
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
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Buckets sized for delegations, which run from seconds to minutes.
    pub fn delegation_latency() -> Self {
        Self::new(vec![
            100.0, 500.0, 1_000.0, 5_000.0, 15_000.0, 30_000.0, 60_000.0, 120_000.0, 300_000.0,
        ])
    }

    pub fn observe(&self, value_ms: f64) {
        let bucket_idx = self
            .bucket_bounds
            .iter()
            .position(|&bound| value_ms <= bound)
            .unwrap_or(self.bucket_bounds.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value_ms * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum_ms() / n as f64,
        }
    }
}

/// How a delegation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    Terminated,
}

#[derive(Debug, Default)]
struct AgentCounters {
    delegated: u64,
    completed: u64,
    failed: u64,
}

/// Per-target delegation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub delegated: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug)]
pub struct DelegationMetrics {
    pub started: Counter,
    pub completed: Counter,
    pub failed: Counter,
    pub timed_out: Counter,
    pub cancelled: Counter,
    pub terminated: Counter,
    pub rejected: Counter,
    pub in_flight: Gauge,
    pub latency_ms: Histogram,
    per_agent: DashMap<String, AgentCounters>,
}

impl Default for DelegationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DelegationMetrics {
    pub fn new() -> Self {
        Self {
            started: Counter::new(),
            completed: Counter::new(),
            failed: Counter::new(),
            timed_out: Counter::new(),
            cancelled: Counter::new(),
            terminated: Counter::new(),
            rejected: Counter::new(),
            in_flight: Gauge::new(),
            latency_ms: Histogram::delegation_latency(),
            per_agent: DashMap::new(),
        }
    }

    /// A delegation was refused before any conversation was created.
    pub fn record_rejected(&self) {
        self.rejected.inc();
    }

    pub fn record_started(&self, target: &str) {
        self.started.inc();
        self.in_flight.inc();
        self.per_agent.entry(target.to_string()).or_default().delegated += 1;
    }

    pub fn record_finished(&self, target: &str, outcome: DelegationOutcome, elapsed: Duration) {
        self.in_flight.dec();
        self.latency_ms.observe(elapsed.as_secs_f64() * 1000.0);

        let counter = match outcome {
            DelegationOutcome::Completed => &self.completed,
            DelegationOutcome::Failed => &self.failed,
            DelegationOutcome::TimedOut => &self.timed_out,
            DelegationOutcome::Cancelled => &self.cancelled,
            DelegationOutcome::Terminated => &self.terminated,
        };
        counter.inc();

        let mut entry = self.per_agent.entry(target.to_string()).or_default();
        if outcome == DelegationOutcome::Completed {
            entry.completed += 1;
        } else {
            entry.failed += 1;
        }
    }

    pub fn agent(&self, name: &str) -> Option<AgentMetrics> {
        self.per_agent.get(name).map(|c| AgentMetrics {
            delegated: c.delegated,
            completed: c.completed,
            failed: c.failed,
        })
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_agent = self
            .per_agent
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    entry.key().clone(),
                    AgentMetrics {
                        delegated: c.delegated,
                        completed: c.completed,
                        failed: c.failed,
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            started: self.started.get(),
            completed: self.completed.get(),
            failed: self.failed.get(),
            timed_out: self.timed_out.get(),
            cancelled: self.cancelled.get(),
            terminated: self.terminated.get(),
            rejected: self.rejected.get(),
            in_flight: self.in_flight.get(),
            avg_latency_ms: self.latency_ms.mean_ms(),
            per_agent,
        }
    }
}

/// Point-in-time copy of [`DelegationMetrics`] for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub terminated: u64,
    pub rejected: u64,
    pub in_flight: i64,
    pub avg_latency_ms: f64,
    pub per_agent: BTreeMap<String, AgentMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new(vec![10.0, 50.0, 100.0]);
        hist.observe(5.0);
        hist.observe(25.0);
        hist.observe(75.0);
        hist.observe(150.0);
        assert_eq!(hist.count(), 4);
        assert!((hist.mean_ms() - 63.75).abs() < 1e-6);
    }

    #[test]
    fn test_delegation_metrics() {
        let metrics = DelegationMetrics::new();
        metrics.record_started("reviewer");
        metrics.record_started("reviewer");
        metrics.record_started("tester");
        assert_eq!(metrics.in_flight.get(), 3);

        metrics.record_finished("reviewer", DelegationOutcome::Completed, Duration::from_millis(20));
        metrics.record_finished("reviewer", DelegationOutcome::TimedOut, Duration::from_secs(1));
        metrics.record_finished("tester", DelegationOutcome::Terminated, Duration::from_millis(5));
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.started, 3);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.timed_out, 1);
        assert_eq!(snapshot.terminated, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(
            snapshot.per_agent["reviewer"],
            AgentMetrics {
                delegated: 2,
                completed: 1,
                failed: 1
            }
        );
        assert_eq!(metrics.agent("tester").unwrap().failed, 1);
        assert!(metrics.agent("ghost").is_none());
    }
}
