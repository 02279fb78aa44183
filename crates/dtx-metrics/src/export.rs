//! Metrics export and snapshot functionality

use crate::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a latency histogram, in microseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Total observation count
    pub count: u64,
    /// Median bucket bound
    pub p50: u64,
    /// 99th percentile bucket bound
    pub p99: u64,
    /// Largest observation
    pub max: u64,
}

impl MetricsSnapshot {
    /// Capture the current values of a store
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let counters = metrics.all_counters().into_iter().collect();
        let gauges = metrics.all_gauges().into_iter().collect();
        let histograms = metrics
            .all_histograms()
            .into_iter()
            .map(|(name, h)| {
                let summary = HistogramSummary {
                    mean: h.mean(),
                    count: h.total_count(),
                    p50: h.quantile(0.5),
                    p99: h.quantile(0.99),
                    max: h.max(),
                };
                (name, summary)
            })
            .collect();

        let snapshot = Self {
            counters,
            gauges,
            histograms,
        };
        debug!(
            "Captured metrics snapshot: {} counters, {} gauges, {} histograms",
            snapshot.counters.len(),
            snapshot.gauges.len(),
            snapshot.histograms.len()
        );
        snapshot
    }

    /// Counter value, 0 when absent
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Export snapshot as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export snapshot as compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
