// src/graph/reporting.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Running performance counters, owned by the engine instance rather than
/// shared global state. Touched from concurrently executing predicate and
/// algorithm calls, hence the interior mutex.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    inner: Mutex<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    total_operations: u64,
    total_duration: Duration,
    cache_lookups: u64,
    cache_hits: u64,
    algorithms: HashMap<String, AlgorithmStat>,
}

#[derive(Debug, Default, Clone)]
struct AlgorithmStat {
    runs: u64,
    total: Duration,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        PerformanceMetrics::default()
    }

    pub fn record_operation(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.total_operations += 1;
        inner.total_duration += duration;
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let mut inner = self.lock();
        inner.cache_lookups += 1;
        if hit {
            inner.cache_hits += 1;
        }
    }

    pub fn record_algorithm(&self, name: &str, duration: Duration) {
        let mut inner = self.lock();
        let stat = inner.algorithms.entry(name.to_string()).or_default();
        stat.runs += 1;
        stat.total += duration;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let mut algorithms: Vec<AlgorithmLatency> = inner
            .algorithms
            .iter()
            .map(|(name, stat)| AlgorithmLatency {
                algorithm: name.clone(),
                runs: stat.runs,
                average_ms: if stat.runs > 0 {
                    stat.total.as_secs_f64() * 1000.0 / stat.runs as f64
                } else {
                    0.0
                },
            })
            .collect();
        algorithms.sort_by(|a, b| a.algorithm.cmp(&b.algorithm));

        MetricsSnapshot {
            total_operations: inner.total_operations,
            average_execution_ms: if inner.total_operations > 0 {
                inner.total_duration.as_secs_f64() * 1000.0 / inner.total_operations as f64
            } else {
                0.0
            },
            cache_lookups: inner.cache_lookups,
            cache_hit_rate: if inner.cache_lookups > 0 {
                inner.cache_hits as f64 / inner.cache_lookups as f64
            } else {
                0.0
            },
            algorithms,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmLatency {
    pub algorithm: String,
    pub runs: u64,
    pub average_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_operations: u64,
    pub average_execution_ms: f64,
    pub cache_lookups: u64,
    pub cache_hit_rate: f64,
    pub algorithms: Vec<AlgorithmLatency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_and_averages() {
        let metrics = PerformanceMetrics::new();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_lookup(true);
        metrics.record_operation(Duration::from_millis(10));
        metrics.record_operation(Duration::from_millis(20));
        metrics.record_algorithm("dijkstra", Duration::from_millis(4));
        metrics.record_algorithm("dijkstra", Duration::from_millis(8));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_operations, 2);
        assert!((snap.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((snap.average_execution_ms - 15.0).abs() < 1.0);
        assert_eq!(snap.algorithms.len(), 1);
        assert_eq!(snap.algorithms[0].runs, 2);
        assert!((snap.algorithms[0].average_ms - 6.0).abs() < 1.0);
    }

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let snap = PerformanceMetrics::new().snapshot();
        assert_eq!(snap.total_operations, 0);
        assert_eq!(snap.cache_hit_rate, 0.0);
        assert!(snap.algorithms.is_empty());
    }
}
