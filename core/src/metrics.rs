//! Latency percentiles over per-worker timings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency percentiles in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    /// Minimum
    pub min: f64,
    /// 50th percentile
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Maximum
    pub max: f64,
    /// Mean
    pub mean: f64,
    /// Standard deviation
    pub stddev: f64,
}

/// In-memory histogram for efficient percentile calculation
/// Uses HdrHistogram so memory stays flat with thousands of workers
pub struct LatencyHistogram {
    histogram: Option<hdrhistogram::Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create a new histogram
    /// Configured for microsecond precision with max 1 hour latency
    pub fn new() -> Self {
        // Bounds are constants, so construction only fails on a programming error;
        // a missing histogram degrades to empty percentiles.
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000_000, 3).ok();
        Self { histogram }
    }

    /// Record a duration (values above the 1 hour bound are clamped)
    pub fn record(&mut self, duration: Duration) {
        if let Some(histogram) = self.histogram.as_mut() {
            let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
            histogram.saturating_record(micros.max(1));
        }
    }

    /// Get the number of recorded values
    pub fn len(&self) -> u64 {
        self.histogram.as_ref().map_or(0, |h| h.len())
    }

    /// Check if the histogram is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calculate percentiles from the histogram
    pub fn percentiles(&self) -> LatencyPercentiles {
        let Some(histogram) = self.histogram.as_ref().filter(|h| !h.is_empty()) else {
            return LatencyPercentiles::default();
        };

        LatencyPercentiles {
            min: histogram.min() as f64 / 1000.0,
            p50: histogram.value_at_quantile(0.50) as f64 / 1000.0,
            p90: histogram.value_at_quantile(0.90) as f64 / 1000.0,
            p95: histogram.value_at_quantile(0.95) as f64 / 1000.0,
            p99: histogram.value_at_quantile(0.99) as f64 / 1000.0,
            max: histogram.max() as f64 / 1000.0,
            mean: histogram.mean() / 1000.0,
            stddev: histogram.stdev() / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LatencyHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyHistogram")
            .field("len", &self.len())
            .finish()
    }
}

/// Min / mean / max of a per-worker rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    /// Slowest worker
    pub min: f64,
    /// Mean across workers
    pub mean: f64,
    /// Fastest worker
    pub max: f64,
}

impl RateSummary {
    /// Summarize a set of rates
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Self { min, mean, max }
    }
}
