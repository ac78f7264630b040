//! Start tokens and the client range they assign

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

use crate::config::ConfigError;

/// Ticket handed out by the start coordinator
///
/// `client_start` is unique per requesting process; `time_start` is the
/// number of seconds that process waits before it starts connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartToken {
    /// Process offset, multiplied by the client count to get the first id
    pub client_start: u64,
    /// Ramp delay in seconds
    pub time_start: u64,
}

impl StartToken {
    /// Create a token
    pub fn new(client_start: u64, time_start: u64) -> Self {
        Self {
            client_start,
            time_start,
        }
    }

    /// Compute the client-id range for a process driving `client_count` clients
    ///
    /// The range is `[client_start * M, client_start * M + M)`; tokens with
    /// different `client_start` values never overlap.
    pub fn assignment(&self, client_count: u64) -> Result<Assignment, ConfigError> {
        if client_count == 0 {
            return Err(ConfigError::ZeroClientCount);
        }
        let overflow = || ConfigError::RangeOverflow {
            client_start: self.client_start,
            client_count,
        };
        let first_id = self
            .client_start
            .checked_mul(client_count)
            .ok_or_else(overflow)?;
        let end_id = first_id.checked_add(client_count).ok_or_else(overflow)?;

        Ok(Assignment {
            ids: first_id..end_id,
            ramp_delay: Duration::from_secs(self.time_start),
        })
    }
}

/// Client ids and ramp delay assigned to this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Worker ids this process owns
    pub ids: Range<u64>,
    /// Delay before the first worker is spawned
    pub ramp_delay: Duration,
}

impl Assignment {
    /// Number of workers in the range
    pub fn len(&self) -> u64 {
        self.ids.end - self.ids.start
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether two assignments share any id
    pub fn overlaps(&self, other: &Assignment) -> bool {
        self.ids.start < other.ids.end && other.ids.start < self.ids.end
    }
}
