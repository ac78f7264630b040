//! Spawn pacing between worker launches

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::time::Duration;

/// Token bucket that lets one worker spawn per interval
///
/// A burst of one keeps launches evenly spaced instead of letting a backlog
/// of connects hit the broker at once.
pub struct SpawnPacer {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    interval: Duration,
}

impl SpawnPacer {
    /// Create a pacer; a zero interval disables pacing
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(RateLimiter::direct);
        Self { limiter, interval }
    }

    /// Create a pacer that never waits
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Wait until the next spawn is allowed
    pub async fn wait(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Check if pacing is enabled
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for SpawnPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnPacer")
            .field("interval", &self.interval)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
