//! Result aggregation from multiple workers

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::counters::RunCounters;
use crate::metrics::{LatencyHistogram, LatencyPercentiles, RateSummary};
use crate::worker::{WorkerEvent, WorkerResult};

/// Distinct connect error messages kept for the report
const MAX_DISTINCT_ERRORS: usize = 32;

/// Aggregated statistics for one process's share of a load run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedStats {
    /// Workers this process was assigned
    pub expected_workers: u64,

    /// Workers that reported a result
    pub reported_workers: u64,

    /// Workers that ran their publish loop
    pub completed_workers: u64,

    /// Workers whose connect failed
    pub connect_failures: u64,

    /// Workers ended early by a drain token
    pub drained_workers: u64,

    /// Total confirmed publishes reported by workers
    pub messages_published: u64,

    /// Total echoes received
    pub messages_received: u64,

    /// Total failed publishes
    pub publish_failures: u64,

    /// Total connection drops seen by transports
    pub connection_losses: u64,

    /// Live publish counter at the time of the report (includes unreported workers)
    pub live_published: u64,

    /// Message ids claimed so far
    pub messages_attempted: u64,

    /// Dispatch start to last result, in seconds
    pub wall_clock_secs: f64,

    /// Confirmed publishes per second of wall clock
    pub throughput: f64,

    /// Per-worker publish-loop time in milliseconds
    pub publish_time_ms: LatencyPercentiles,

    /// Per-worker time until the last echo in milliseconds
    pub receive_time_ms: LatencyPercentiles,

    /// Per-worker publish rate in messages per second
    pub publish_rate: RateSummary,

    /// Connect error messages with their counts
    pub connect_errors: BTreeMap<String, u64>,

    /// Whether a termination signal cut the run short
    pub interrupted: bool,
}

impl AggregatedStats {
    /// Workers that never reported (not spawned yet or still running at exit)
    pub fn unreported_workers(&self) -> u64 {
        self.expected_workers.saturating_sub(self.reported_workers)
    }

    /// Fraction of reporting workers that connected (0.0 - 1.0)
    pub fn connect_success_rate(&self) -> f64 {
        if self.reported_workers > 0 {
            self.completed_workers as f64 / self.reported_workers as f64
        } else {
            0.0
        }
    }

    /// Fraction of attempted publishes that were confirmed (0.0 - 1.0)
    pub fn publish_success_rate(&self) -> f64 {
        let total = self.messages_published + self.publish_failures;
        if total > 0 {
            self.messages_published as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Accumulates worker results as they arrive
///
/// Results are consumed in any order; a second result for the same worker
/// id is ignored so every worker is counted once.
pub struct ResultAggregator {
    expected: u64,
    counters: Arc<RunCounters>,
    seen: HashSet<u64>,
    started_at: Option<Instant>,
    last_result_at: Option<Instant>,
    stats: AggregatedStats,
    publish_times: LatencyHistogram,
    receive_times: LatencyHistogram,
    rates: Vec<f64>,
}

impl ResultAggregator {
    /// Create an aggregator expecting `expected` results
    pub fn new(expected: u64, counters: Arc<RunCounters>) -> Self {
        Self {
            expected,
            counters,
            seen: HashSet::new(),
            started_at: None,
            last_result_at: None,
            stats: AggregatedStats {
                expected_workers: expected,
                ..AggregatedStats::default()
            },
            publish_times: LatencyHistogram::new(),
            receive_times: LatencyHistogram::new(),
            rates: Vec::new(),
        }
    }

    /// Mark dispatch start; throughput is measured from here
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Record one result; returns `false` for a duplicate
    pub fn record(&mut self, result: WorkerResult) -> bool {
        if !self.seen.insert(result.worker_id) {
            tracing::warn!(worker_id = result.worker_id, "Duplicate worker result ignored");
            return false;
        }
        self.last_result_at = Some(Instant::now());
        self.stats.reported_workers += 1;

        match result.event {
            WorkerEvent::ConnectFailed => {
                self.stats.connect_failures += 1;
                let message = result.error.unwrap_or_else(|| "unknown".to_string());
                let distinct = self.stats.connect_errors.len();
                if let Some(count) = self.stats.connect_errors.get_mut(&message) {
                    *count += 1;
                } else if distinct < MAX_DISTINCT_ERRORS {
                    self.stats.connect_errors.insert(message, 1);
                }
            }
            WorkerEvent::Completed => {
                self.stats.completed_workers += 1;
                self.stats.messages_published += result.messages_published as u64;
                self.stats.messages_received += result.messages_received as u64;
                self.stats.publish_failures += result.publish_failures as u64;
                self.stats.connection_losses += result.connection_losses as u64;
                if result.drained {
                    self.stats.drained_workers += 1;
                }
                self.publish_times.record(result.publish_time);
                self.receive_times.record(result.receive_time);
                self.rates.push(result.publish_rate());
            }
        }
        true
    }

    /// Whether every expected worker has reported
    pub fn is_complete(&self) -> bool {
        self.seen.len() as u64 >= self.expected
    }

    /// Results recorded so far
    pub fn reported(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Mark the run as cut short by a termination signal
    pub fn mark_interrupted(&mut self) {
        self.stats.interrupted = true;
    }

    /// Build the final statistics
    pub fn finish(&self) -> AggregatedStats {
        let mut stats = self.stats.clone();

        let span = match (self.started_at, self.last_result_at) {
            (Some(start), Some(last)) => last.saturating_duration_since(start),
            _ => Default::default(),
        };
        stats.wall_clock_secs = span.as_secs_f64();
        stats.throughput = if stats.wall_clock_secs > 0.0 {
            stats.messages_published as f64 / stats.wall_clock_secs
        } else {
            0.0
        };

        stats.publish_time_ms = self.publish_times.percentiles();
        stats.receive_time_ms = self.receive_times.percentiles();
        stats.publish_rate = RateSummary::from_values(&self.rates);
        stats.live_published = self.counters.published();
        stats.messages_attempted = self.counters.messages_attempted();
        stats
    }
}

impl std::fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAggregator")
            .field("expected", &self.expected)
            .field("reported", &self.seen.len())
            .finish()
    }
}
