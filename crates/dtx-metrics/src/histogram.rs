//! Latency histogram

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bucket bounds in microseconds
const DEFAULT_BOUNDS_US: [u64; 12] = [
    10, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 250_000, 1_000_000,
];

/// Fixed-bucket histogram of durations, recorded in microseconds
///
/// Observations above the last bound land in an overflow bucket.
pub struct LatencyHistogram {
    bounds: Vec<u64>,
    /// One count per bound plus the overflow bucket
    counts: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl LatencyHistogram {
    /// Create a histogram with the default microsecond buckets
    pub fn new() -> Self {
        Self::with_bounds(DEFAULT_BOUNDS_US.to_vec())
    }

    /// Create a histogram with custom, ascending bounds in microseconds
    pub fn with_bounds(mut bounds: Vec<u64>) -> Self {
        bounds.sort_unstable();
        bounds.dedup();
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record a duration
    pub fn observe(&self, elapsed: Duration) {
        self.observe_micros(elapsed.as_micros().min(u64::MAX as u128) as u64);
    }

    /// Record a raw microsecond value
    pub fn observe_micros(&self, micros: u64) {
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(micros, Ordering::Relaxed);

        let bucket = self.bounds.partition_point(|bound| *bound < micros);
        self.counts[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Mean in microseconds, 0 when empty
    pub fn mean(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Number of observations
    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Largest observation in microseconds
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Upper bound of the bucket holding the `q` quantile
    ///
    /// Returns the recorded maximum when the quantile falls in the overflow
    /// bucket and 0 when the histogram is empty.
    pub fn quantile(&self, q: f64) -> u64 {
        let total = self.total_count();
        if total == 0 {
            return 0;
        }
        let rank = ((q.clamp(0.0, 1.0) * total as f64).ceil() as u64).max(1);
        let mut seen = 0;
        for (i, count) in self.counts.iter().enumerate() {
            seen += count.load(Ordering::Relaxed);
            if seen >= rank {
                return self.bounds.get(i).copied().unwrap_or_else(|| self.max());
            }
        }
        self.max()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}
