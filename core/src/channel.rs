//! Channels shared between the dispatcher, workers and the shutdown path

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Channel buffer configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Result channel buffer size (workers -> aggregator)
    pub result_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            result_buffer: 10_000,
        }
    }
}

impl ChannelConfig {
    /// Create a new channel config with a custom result buffer size
    pub fn with_result_buffer(mut self, size: usize) -> Self {
        self.result_buffer = size;
        self
    }
}

/// Unit token telling one worker to disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectSignal;

/// Bounded multi-consumer channel of [`DisconnectSignal`] tokens
///
/// Tokens carry no data, so the buffer is stored as a permit count: sending
/// adds one permit, receiving takes one. Capacity is fixed at construction
/// and sends never wait; a send past capacity fails immediately instead.
/// Every token is consumed by exactly one receiver.
#[derive(Debug)]
pub struct DrainChannel;

impl DrainChannel {
    /// Create a drain channel with room for `capacity` tokens
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> (DrainSender, DrainReceiver) {
        let tokens = Arc::new(Semaphore::new(0));
        let sender = DrainSender {
            tokens: Arc::clone(&tokens),
            sent: Arc::new(AtomicUsize::new(0)),
            capacity,
        };
        (sender, DrainReceiver { tokens })
    }
}

/// Error returned when a drain token cannot be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DrainSendError {
    /// Every slot already received its token
    #[error("drain channel full ({0} tokens)")]
    Full(usize),
    /// The channel was closed
    #[error("drain channel closed")]
    Closed,
}

/// Sending half of a [`DrainChannel`]
#[derive(Debug, Clone)]
pub struct DrainSender {
    tokens: Arc<Semaphore>,
    sent: Arc<AtomicUsize>,
    capacity: usize,
}

impl DrainSender {
    /// Queue one token without waiting
    pub fn send(&self, _signal: DisconnectSignal) -> Result<(), DrainSendError> {
        if self.tokens.is_closed() {
            return Err(DrainSendError::Closed);
        }
        self.sent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |sent| {
                (sent < self.capacity).then_some(sent + 1)
            })
            .map_err(|_| DrainSendError::Full(self.capacity))?;
        self.tokens.add_permits(1);
        Ok(())
    }

    /// Tokens sent so far
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Acquire)
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close the channel; pending and future receives return `None`
    pub fn close(&self) {
        self.tokens.close();
    }
}

/// Receiving half of a [`DrainChannel`], cloned into every worker
#[derive(Debug, Clone)]
pub struct DrainReceiver {
    tokens: Arc<Semaphore>,
}

impl DrainReceiver {
    /// Wait for a token
    ///
    /// Returns `None` once the channel is closed. Cancel safe: a dropped
    /// receive never loses a token.
    pub async fn recv(&self) -> Option<DisconnectSignal> {
        let permit = self.tokens.acquire().await.ok()?;
        permit.forget();
        Some(DisconnectSignal)
    }

    /// Take a token if one is queued
    pub fn try_recv(&self) -> Option<DisconnectSignal> {
        let permit = self.tokens.try_acquire().ok()?;
        permit.forget();
        Some(DisconnectSignal)
    }

    /// Tokens currently queued and not yet consumed
    pub fn pending(&self) -> usize {
        self.tokens.available_permits()
    }
}
