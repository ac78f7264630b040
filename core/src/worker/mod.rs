//! Connection workers
//!
//! A Worker is one simulated client and the core execution unit of a load
//! run. Its lifecycle is a straight line:
//!
//! **connect -> publish loop -> (hold) -> disconnect -> report**
//!
//! 1. Resolves its topic and client ids from the naming templates
//! 2. Optionally connects a subscriber session and subscribes to its topic
//! 3. Connects the publisher session within the operation timeout
//! 4. Publishes `messages` payloads, pausing between publishes
//! 5. Optionally holds the connection open until a drain token arrives
//! 6. Disconnects with a bounded grace and sends exactly one [`WorkerResult`]
//!
//! Failures inside the loop are counted, never propagated. A drain token
//! ends the loop between publishes; a publish already in flight always
//! runs to completion or timeout.
//!
//! # Example
//!
//! ```ignore
//! use connbench_core::worker::WorkerBuilder;
//!
//! let worker = WorkerBuilder::new(42)
//!     .config(template.clone())
//!     .connector(connector)
//!     .results_tx(tx)
//!     .counters(counters)
//!     .build()?;
//!
//! let result = worker.run(drain_rx).await;
//! println!("published: {}", result.messages_published);
//! ```

mod builder;
mod config;
mod executor;
mod handler;
mod stats;

pub use builder::WorkerBuilder;
pub use config::WorkerConfig;
pub use executor::Worker;
pub use stats::{WorkerEvent, WorkerResult, WorkerStats};

/// Placeholder replaced by the worker id in naming templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Templates for per-worker topic and client ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTemplates {
    /// Topic the worker publishes to
    pub topic: String,
    /// Client id of the publisher session
    pub publisher_id: String,
    /// Client id of the subscriber session
    pub subscriber_id: String,
}

impl Default for NamingTemplates {
    fn default() -> Self {
        Self {
            topic: "connbench/{id}".to_string(),
            publisher_id: "connbench-{id}-pub".to_string(),
            subscriber_id: "connbench-{id}-sub".to_string(),
        }
    }
}

impl NamingTemplates {
    /// Fill in the templates for one worker
    pub fn resolve(&self, worker_id: u64) -> ClientNames {
        let id = worker_id.to_string();
        ClientNames {
            topic: self.topic.replace(ID_PLACEHOLDER, &id),
            publisher_id: self.publisher_id.replace(ID_PLACEHOLDER, &id),
            subscriber_id: self.subscriber_id.replace(ID_PLACEHOLDER, &id),
        }
    }
}

/// Resolved names for one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNames {
    /// Topic
    pub topic: String,
    /// Publisher client id
    pub publisher_id: String,
    /// Subscriber client id
    pub subscriber_id: String,
}
