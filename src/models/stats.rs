//! Rolling inference-latency windows per artifact key.

use std::collections::{BTreeMap, VecDeque};

use dashmap::DashMap;
use serde::Serialize;

/// Most recent samples kept per key.
pub const SAMPLE_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub count: usize,
}

#[derive(Debug, Default)]
struct SampleWindow {
    samples: VecDeque<f64>,
}

impl SampleWindow {
    fn push(&mut self, latency_ms: f64) {
        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    fn summary(&self) -> Option<LatencyStats> {
        if self.samples.is_empty() {
            return None;
        }
        let (sum, min, max) = self.samples.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), &s| (sum + s, min.min(s), max.max(s)),
        );
        Some(LatencyStats {
            avg_ms: sum / self.samples.len() as f64,
            min_ms: min,
            max_ms: max,
            count: self.samples.len(),
        })
    }
}

/// Concurrent map of `type:name:version` to its sample window.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    windows: DashMap<String, SampleWindow>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, latency_ms: f64) {
        self.windows.entry(key.to_string()).or_default().push(latency_ms);
    }

    pub fn remove(&self, key: &str) {
        self.windows.remove(key);
    }

    pub fn get(&self, key: &str) -> Option<LatencyStats> {
        self.windows.get(key).and_then(|w| w.summary())
    }

    pub fn snapshot(&self) -> BTreeMap<String, LatencyStats> {
        self.windows
            .iter()
            .filter_map(|entry| entry.summary().map(|s| (entry.key().clone(), s)))
            .collect()
    }

    pub fn clear(&self) {
        self.windows.clear();
    }
}
