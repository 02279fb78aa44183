//! Metrics collector implementation

use crate::LatencyHistogram;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe metrics store shared by the lock table, scheduler and
/// execution engine
#[derive(Default)]
pub struct Metrics {
    histograms: DashMap<String, Arc<LatencyHistogram>>,
    counters: DashMap<String, Arc<AtomicU64>>,
    gauges: DashMap<String, Arc<AtomicI64>>,
}

impl Metrics {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind an `Arc`
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn histogram_entry(&self, name: &str) -> Arc<LatencyHistogram> {
        if let Some(h) = self.histograms.get(name) {
            return Arc::clone(h.value());
        }
        Arc::clone(
            self.histograms
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(LatencyHistogram::new()))
                .value(),
        )
    }

    /// Record a duration in the named histogram
    pub fn observe(&self, name: &str, elapsed: Duration) {
        self.histogram_entry(name).observe(elapsed);
    }

    /// Increment a counter
    pub fn incr(&self, name: &str, delta: u64) {
        if let Some(c) = self.counters.get(name) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Set a gauge
    pub fn gauge(&self, name: &str, value: i64) {
        if let Some(g) = self.gauges.get(name) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .store(value, Ordering::Relaxed);
    }

    /// Add to a gauge, which may go negative
    pub fn gauge_add(&self, name: &str, delta: i64) {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Counter value, `None` if never incremented
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).map(|c| c.load(Ordering::Relaxed))
    }

    /// Gauge value, `None` if never set
    pub fn get_gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).map(|g| g.load(Ordering::Relaxed))
    }

    /// Histogram handle, `None` if never observed
    pub fn get_histogram(&self, name: &str) -> Option<Arc<LatencyHistogram>> {
        self.histograms.get(name).map(|h| Arc::clone(h.value()))
    }

    pub(crate) fn all_counters(&self) -> Vec<(String, u64)> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn all_gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn all_histograms(&self) -> Vec<(String, Arc<LatencyHistogram>)> {
        self.histograms
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }
}
