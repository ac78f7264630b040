//! Token issuance
//!
//! Both halves of a [`StartToken`] derive from a single atomic issuance
//! counter, so concurrent requests always see a consistent pair:
//! `clientStart = client_base + n` and `timeStart = time_base + n * time_step`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use connbench_core::StartToken;

use crate::error::CoordinatorError;

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:8099";

/// Default ramp-delay step between consecutive tokens, in seconds
pub const DEFAULT_TIME_STEP: u64 = 10;

/// Start coordinator settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// `clientStart` of the first token
    pub client_base: u64,
    /// `timeStart` of the first token
    pub time_base: u64,
    /// `timeStart` increment per token
    pub time_step: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8099)),
            client_base: 0,
            time_base: 0,
            time_step: DEFAULT_TIME_STEP,
        }
    }
}

/// Hands out globally ordered start tokens
#[derive(Debug)]
pub struct StartCoordinator {
    client_base: u64,
    time_base: u64,
    time_step: u64,
    issued: AtomicU64,
}

impl StartCoordinator {
    /// Create a coordinator from its settings
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            client_base: config.client_base,
            time_base: config.time_base,
            time_step: config.time_step,
            issued: AtomicU64::new(0),
        }
    }

    /// Issue the next token
    ///
    /// Fails once either half would overflow; the counter never wraps and
    /// stays exhausted from then on.
    pub fn issue(&self) -> Result<StartToken, CoordinatorError> {
        let n = self
            .issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                self.token_at(n)?;
                n.checked_add(1)
            })
            .map_err(|issued| CoordinatorError::Exhausted { issued })?;

        self.token_at(n)
            .ok_or(CoordinatorError::Exhausted { issued: n })
    }

    /// Tokens issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    fn token_at(&self, n: u64) -> Option<StartToken> {
        let client_start = self.client_base.checked_add(n)?;
        let time_start = self
            .time_step
            .checked_mul(n)
            .and_then(|offset| self.time_base.checked_add(offset))?;
        Some(StartToken::new(client_start, time_start))
    }
}

impl Default for StartCoordinator {
    fn default() -> Self {
        Self::new(&CoordinatorConfig::default())
    }
}
