//! Run-scoped shared counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every worker of one load run
///
/// Both are only ever advanced with atomic increments; reads are for
/// reporting and may lag in-flight publishes.
#[derive(Debug)]
pub struct RunCounters {
    base_message_id: u64,
    next_message_id: AtomicU64,
    published: AtomicU64,
}

impl RunCounters {
    /// Counters whose message ids start at `base`
    pub fn new(base: u64) -> Self {
        Self {
            base_message_id: base,
            next_message_id: AtomicU64::new(base),
            published: AtomicU64::new(0),
        }
    }

    /// Counters with a random message-id base, so ids from separate
    /// load-generator processes are unlikely to collide
    pub fn with_random_base() -> Self {
        // Keep half the id space free so a long run never wraps.
        Self::new(rand::random::<u64>() >> 1)
    }

    /// Claim the next message id
    pub fn next_message_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record one confirmed publish
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Confirmed publishes so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Message ids claimed so far
    pub fn messages_attempted(&self) -> u64 {
        self.next_message_id
            .load(Ordering::Relaxed)
            .wrapping_sub(self.base_message_id)
    }
}

impl Default for RunCounters {
    fn default() -> Self {
        Self::new(0)
    }
}
