use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

const SAMPLE_CAP: usize = 500;

/// Nearest-rank percentile over a sorted copy; empty input yields `0.0`.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last = sorted.len() - 1;
    let rank = ((p / 100.0) * last as f64).round_ties_even();
    let k = (rank.max(0.0) as usize).min(last);
    sorted[k]
}

#[derive(Debug, Default)]
struct Samples {
    values: Mutex<VecDeque<f64>>,
}

impl Samples {
    fn push(&self, ms: f64) {
        let mut values = self.values.lock();
        values.push_back(ms);
        while values.len() > SAMPLE_CAP {
            values.pop_front();
        }
    }

    fn summary(&self) -> LatencySummary {
        let values: Vec<f64> = self.values.lock().iter().copied().collect();
        LatencySummary {
            count: values.len(),
            p50: percentile(&values, 50.0),
            p95: percentile(&values, 95.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub tool_calls_attempted: u64,
    pub tool_validation_failed: u64,
    pub blocked: u64,
    pub router_hits: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub tool_call_latency_ms: LatencySummary,
    pub command_latency_ms: LatencySummary,
    pub counters: Counters,
}

/// In-process dispatch metrics.  Latency windows keep the latest 500 samples.
#[derive(Debug, Default)]
pub struct Metrics {
    tool_latency: Samples,
    command_latency: Samples,
    tool_calls_attempted: AtomicU64,
    tool_validation_failed: AtomicU64,
    blocked: AtomicU64,
    router_hits: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tool_call_latency(&self, ms: f64) {
        self.tool_latency.push(ms);
    }

    pub fn record_command_latency(&self, ms: f64) {
        self.command_latency.push(ms);
    }

    pub fn record_tool_call_attempted(&self) {
        self.tool_calls_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_validation_failed(&self) {
        self.tool_validation_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_router_hit(&self) {
        self.router_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tool_call_latency_ms: self.tool_latency.summary(),
            command_latency_ms: self.command_latency.summary(),
            counters: Counters {
                tool_calls_attempted: self.tool_calls_attempted.load(Ordering::Relaxed),
                tool_validation_failed: self.tool_validation_failed.load(Ordering::Relaxed),
                blocked: self.blocked.load(Ordering::Relaxed),
                router_hits: self.router_hits.load(Ordering::Relaxed),
            },
        }
    }
}
