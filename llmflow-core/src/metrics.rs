//! Operational metrics — additive counters and per-stage latencies.
//!
//! Counters only ever increase (until process restart) and are safe to
//! bump from many in-flight tasks. `snapshot()` rebuilds a read-only
//! view on every call and never mutates the underlying counters.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Shared metrics sink for the engine and its collaborators.
pub struct Metrics {
    tasks_started: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    llm_calls: AtomicU64,
    llm_errors: AtomicU64,
    llm_cache_hits: AtomicU64,
    search_calls: AtomicU64,
    search_errors: AtomicU64,
    planner_calls: AtomicU64,
    planner_errors: AtomicU64,
    sources_merged: AtomicU64,
    /// Arbitrary named counters.
    counters: RwLock<HashMap<String, u64>>,
    /// Per-stage latency accumulators: (count, total milliseconds).
    timings: RwLock<HashMap<String, (u64, u64)>>,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_started: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            llm_calls: AtomicU64::new(0),
            llm_errors: AtomicU64::new(0),
            llm_cache_hits: AtomicU64::new(0),
            search_calls: AtomicU64::new(0),
            search_errors: AtomicU64::new(0),
            planner_calls: AtomicU64::new(0),
            planner_errors: AtomicU64::new(0),
            sources_merged: AtomicU64::new(0),
            counters: RwLock::new(HashMap::new()),
            timings: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn record_task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_error(&self) {
        self.llm_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_cache_hit(&self) {
        self.llm_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_call(&self) {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_error(&self) {
        self.search_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planner_call(&self) {
        self.planner_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_planner_error(&self) {
        self.planner_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sources_merged(&self, count: u64) {
        self.sources_merged.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment an arbitrary named counter.
    pub fn increment(&self, name: &str, value: u64) {
        let mut counters = self.counters.write().unwrap();
        *counters.entry(name.to_string()).or_insert(0) += value;
    }

    /// Record a stage latency in milliseconds.
    pub fn record_timing(&self, stage: &str, millis: u64) {
        let mut timings = self.timings.write().unwrap();
        let entry = timings.entry(stage.to_string()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += millis;
    }

    /// Time a stage through a guard that records on drop.
    pub fn timer(&self, stage: &str) -> StageTimer<'_> {
        StageTimer {
            metrics: self,
            stage: stage.to_string(),
            start: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Build a read-only aggregate view.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let llm_calls = self.llm_calls.load(Ordering::Relaxed);
        let llm_cache_hits = self.llm_cache_hits.load(Ordering::Relaxed);
        let cache_hit_ratio = if llm_calls > 0 {
            llm_cache_hits as f64 / llm_calls as f64
        } else {
            0.0
        };

        let timings = self.timings.read().unwrap();
        let stage_latency_ms: HashMap<String, StageLatency> = timings
            .iter()
            .map(|(stage, (count, total))| {
                (
                    stage.clone(),
                    StageLatency {
                        count: *count,
                        avg_ms: if *count > 0 {
                            *total as f64 / *count as f64
                        } else {
                            0.0
                        },
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            llm_calls,
            llm_errors: self.llm_errors.load(Ordering::Relaxed),
            llm_cache_hits,
            cache_hit_ratio,
            search_calls: self.search_calls.load(Ordering::Relaxed),
            search_errors: self.search_errors.load(Ordering::Relaxed),
            planner_calls: self.planner_calls.load(Ordering::Relaxed),
            planner_errors: self.planner_errors.load(Ordering::Relaxed),
            sources_merged: self.sources_merged.load(Ordering::Relaxed),
            counters: self.counters.read().unwrap().clone(),
            stage_latency_ms,
            uptime_secs: self.uptime_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the elapsed time for a stage when dropped.
pub struct StageTimer<'a> {
    metrics: &'a Metrics,
    stage: String,
    start: Instant,
}

impl Drop for StageTimer<'_> {
    fn drop(&mut self) {
        let millis = self.start.elapsed().as_millis() as u64;
        self.metrics.record_timing(&self.stage, millis);
    }
}

/// Average latency for one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageLatency {
    pub count: u64,
    pub avg_ms: f64,
}

/// Immutable aggregate of all metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub llm_calls: u64,
    pub llm_errors: u64,
    pub llm_cache_hits: u64,
    pub cache_hit_ratio: f64,
    pub search_calls: u64,
    pub search_errors: u64,
    pub planner_calls: u64,
    pub planner_errors: u64,
    pub sources_merged: u64,
    pub counters: HashMap<String, u64>,
    pub stage_latency_ms: HashMap<String, StageLatency>,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_task_started();
        metrics.record_task_started();
        metrics.record_task_completed();
        metrics.record_search_call();
        metrics.record_search_error();

        let snap = metrics.snapshot();
        assert_eq!(snap.tasks_started, 2);
        assert_eq!(snap.tasks_completed, 1);
        assert_eq!(snap.search_calls, 1);
        assert_eq!(snap.search_errors, 1);
    }

    #[test]
    fn test_cache_hit_ratio() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().cache_hit_ratio, 0.0);

        metrics.record_llm_call();
        metrics.record_llm_call();
        metrics.record_llm_call();
        metrics.record_llm_call();
        metrics.record_llm_cache_hit();
        assert!((metrics.snapshot().cache_hit_ratio - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_named_counters() {
        let metrics = Metrics::new();
        metrics.increment("queries.duckduckgo", 1);
        metrics.increment("queries.duckduckgo", 2);
        let snap = metrics.snapshot();
        assert_eq!(snap.counters["queries.duckduckgo"], 3);
    }

    #[test]
    fn test_stage_latency_average() {
        let metrics = Metrics::new();
        metrics.record_timing("search", 100);
        metrics.record_timing("search", 300);
        let snap = metrics.snapshot();
        let latency = &snap.stage_latency_ms["search"];
        assert_eq!(latency.count, 2);
        assert!((latency.avg_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let metrics = Metrics::new();
        {
            let _timer = metrics.timer("plan");
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.stage_latency_ms["plan"].count, 1);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let metrics = Metrics::new();
        metrics.record_llm_call();
        let first = metrics.snapshot();
        let second = metrics.snapshot();
        assert_eq!(first.llm_calls, second.llm_calls);
    }

    #[test]
    fn test_concurrent_increments() {
        use std::sync::Arc;
        let metrics = Arc::new(Metrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    m.record_llm_call();
                    m.increment("shared", 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.llm_calls, 800);
        assert_eq!(snap.counters["shared"], 800);
    }
}
