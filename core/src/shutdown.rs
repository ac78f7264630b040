//! Termination signals and the drain protocol
//!
//! On a termination signal every worker slot gets one [`DisconnectSignal`].
//! Sends never block: the drain channel was sized to the slot count when the
//! run started, so the whole batch always fits.

use std::time::Duration;

use crate::channel::{DisconnectSignal, DrainSendError, DrainSender};

/// Pushes drain tokens and owns the post-signal grace period
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    drain: DrainSender,
    slots: usize,
    grace: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator for `slots` workers
    pub fn new(drain: DrainSender, slots: usize, grace: Duration) -> Self {
        Self {
            drain,
            slots,
            grace,
        }
    }

    /// Send one token per worker slot; returns the number of tokens queued
    ///
    /// Calling it again after all tokens were sent queues nothing.
    pub fn drain(&self) -> usize {
        let mut sent = 0;
        for _ in 0..self.slots {
            match self.drain.send(DisconnectSignal) {
                Ok(()) => sent += 1,
                Err(DrainSendError::Full(_)) => break,
                Err(DrainSendError::Closed) => {
                    tracing::debug!("Drain channel closed before all tokens were sent");
                    break;
                }
            }
        }
        tracing::info!(
            tokens = sent,
            slots = self.slots,
            grace_secs = self.grace.as_secs_f64(),
            "Drain tokens sent"
        );
        sent
    }

    /// Grace period to keep collecting results after draining
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Worker slots covered by this coordinator
    pub fn slots(&self) -> usize {
        self.slots
    }
}

/// Wait for SIGINT, SIGTERM or SIGQUIT and return the signal's name
#[cfg(unix)]
pub async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let handlers = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    );
    let (mut interrupt, mut terminate, mut quit) = match handlers {
        (Ok(interrupt), Ok(terminate), Ok(quit)) => (interrupt, terminate, quit),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    }
}

/// Wait for Ctrl+C and return the signal's name
#[cfg(not(unix))]
pub async fn wait_for_termination() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "Ctrl+C",
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending().await
        }
    }
}
