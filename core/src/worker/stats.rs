//! Worker statistics tracking

use std::time::{Duration, Instant};

/// Statistics tracked by each worker while it runs
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Publishes confirmed by the transport
    pub published: usize,

    /// Publishes that failed or timed out
    pub publish_failures: usize,

    /// Messages received on the echo subscription
    pub received: usize,

    /// Times the transport reported a lost connection
    pub connection_losses: usize,

    /// Last message id claimed by this worker
    pub last_message_id: Option<u64>,

    /// Publish loop start time
    pub started_at: Option<Instant>,

    /// Publish loop end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Publishes attempted (confirmed + failed)
    pub fn attempted(&self) -> usize {
        self.published + self.publish_failures
    }

    /// Record a confirmed publish
    pub fn record_published(&mut self, message_id: u64) {
        self.published += 1;
        self.last_message_id = Some(message_id);
    }

    /// Record a failed publish
    pub fn record_failure(&mut self, message_id: u64) {
        self.publish_failures += 1;
        self.last_message_id = Some(message_id);
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }
}

/// Terminal outcome of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerEvent {
    /// The publisher session never came up
    ConnectFailed,
    /// The worker ran its loop (possibly cut short by a drain token)
    Completed,
}

impl WorkerEvent {
    /// Lowercase label for logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerEvent::ConnectFailed => "connect_failed",
            WorkerEvent::Completed => "completed",
        }
    }
}

/// Result a worker sends to the aggregator, exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    /// Worker id inside the process's assigned range
    pub worker_id: u64,
    /// Outcome
    pub event: WorkerEvent,
    /// Connect error for [`WorkerEvent::ConnectFailed`]
    pub error: Option<String>,
    /// Time spent in the publish loop
    pub publish_time: Duration,
    /// Time from loop start until the last echo (or loop end without subscribe)
    pub receive_time: Duration,
    /// Confirmed publishes
    pub messages_published: usize,
    /// Echoes received on the subscription
    pub messages_received: usize,
    /// Failed publishes
    pub publish_failures: usize,
    /// Connection drops seen by the transport
    pub connection_losses: usize,
    /// Whether a drain token ended the worker
    pub drained: bool,
}

impl WorkerResult {
    /// Result for a worker whose connect failed
    pub fn connect_failed(worker_id: u64, error: impl Into<String>) -> Self {
        Self {
            worker_id,
            event: WorkerEvent::ConnectFailed,
            error: Some(error.into()),
            publish_time: Duration::ZERO,
            receive_time: Duration::ZERO,
            messages_published: 0,
            messages_received: 0,
            publish_failures: 0,
            connection_losses: 0,
            drained: false,
        }
    }

    /// Result for a worker that ran its loop
    pub fn completed(
        worker_id: u64,
        stats: &WorkerStats,
        receive_time: Duration,
        drained: bool,
    ) -> Self {
        Self {
            worker_id,
            event: WorkerEvent::Completed,
            error: None,
            publish_time: stats.elapsed().unwrap_or_default(),
            receive_time,
            messages_published: stats.published,
            messages_received: stats.received,
            publish_failures: stats.publish_failures,
            connection_losses: stats.connection_losses,
            drained,
        }
    }

    /// Whether the worker completed
    pub fn is_completed(&self) -> bool {
        self.event == WorkerEvent::Completed
    }

    /// Confirmed publishes per second of publish time
    pub fn publish_rate(&self) -> f64 {
        let secs = self.publish_time.as_secs_f64();
        if secs > 0.0 {
            self.messages_published as f64 / secs
        } else {
            0.0
        }
    }
}
