//! Session callbacks owned by one worker

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::traits::{SessionHandler, TransportError};

/// Counts echoes on the worker's own topic and connection drops
pub(crate) struct WorkerHandler {
    worker_id: u64,
    topic: String,
    created: Instant,
    received: AtomicUsize,
    /// Microseconds after `created` of the last echo, 0 when none arrived
    last_received_us: AtomicU64,
    connection_losses: AtomicUsize,
    changed: Notify,
}

impl WorkerHandler {
    pub(crate) fn new(worker_id: u64, topic: String) -> Self {
        Self {
            worker_id,
            topic,
            created: Instant::now(),
            received: AtomicUsize::new(0),
            last_received_us: AtomicU64::new(0),
            connection_losses: AtomicUsize::new(0),
            changed: Notify::new(),
        }
    }

    pub(crate) fn received(&self) -> usize {
        self.received.load(Ordering::Acquire)
    }

    pub(crate) fn connection_losses(&self) -> usize {
        self.connection_losses.load(Ordering::Relaxed)
    }

    /// Instant of the last echo, if any
    pub(crate) fn last_received(&self) -> Option<Instant> {
        match self.last_received_us.load(Ordering::Acquire) {
            0 => None,
            us => Some(self.created + Duration::from_micros(us)),
        }
    }

    /// Wait until at least `expected` echoes arrived or `timeout` elapses
    ///
    /// Returns whether the count was reached.
    pub(crate) async fn wait_for(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            if self.received() >= expected {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received() >= expected;
            }
        }
    }
}

impl SessionHandler for WorkerHandler {
    fn on_connect(&self) {
        tracing::trace!(worker_id = self.worker_id, "Session connected");
    }

    fn on_message(&self, topic: &str, _payload: &[u8]) {
        if topic != self.topic {
            return;
        }
        let us = u64::try_from(self.created.elapsed().as_micros())
            .unwrap_or(u64::MAX)
            .max(1);
        self.last_received_us.store(us, Ordering::Release);
        self.received.fetch_add(1, Ordering::AcqRel);
        self.changed.notify_waiters();
    }

    fn on_connection_lost(&self, error: &TransportError) {
        self.connection_losses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(worker_id = self.worker_id, error = %error, "Connection lost");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_only_own_topic() {
        let handler = WorkerHandler::new(1, "connbench/1".into());
        handler.on_message("connbench/1", b"a");
        handler.on_message("connbench/2", b"b");
        handler.on_message("connbench/1", b"c");

        assert_eq!(handler.received(), 2);
        assert!(handler.last_received().is_some());
    }

    #[test]
    fn test_connection_losses() {
        let handler = WorkerHandler::new(1, "t".into());
        handler.on_connection_lost(&TransportError::ConnectionLost("reset".into()));
        assert_eq!(handler.connection_losses(), 1);
        assert!(handler.last_received().is_none());
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_message() {
        let handler = Arc::new(WorkerHandler::new(1, "t".into()));
        let producer = Arc::clone(&handler);
        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                producer.on_message("t", b"x");
            }
        });

        assert!(handler.wait_for(3, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let handler = WorkerHandler::new(1, "t".into());
        assert!(!handler.wait_for(1, Duration::from_millis(20)).await);
    }
}
