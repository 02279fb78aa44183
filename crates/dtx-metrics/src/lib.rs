//! # dtx-metrics
//!
//! Observability and metrics collection for the dtx coordinator.
//!
//! Features:
//! - Latency histograms (parked time, allocation time)
//! - Counters for lock claims, transaction stages and task outcomes
//! - Gauges for queue depths
//! - JSON export

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod export;
mod histogram;
pub mod names;

pub use collector::Metrics;
pub use export::{HistogramSummary, MetricsSnapshot};
pub use histogram::LatencyHistogram;

/// Time a block of code and record the elapsed microseconds in a histogram
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.observe($name, start.elapsed());
        result
    }};
}
