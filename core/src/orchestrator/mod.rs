//! Dispatcher for load-run lifecycle management
//!
//! The Dispatcher coordinates one process's share of a load run:
//! - Turning a start token into a worker-id range and ramp delay
//! - Spawning one worker per id, paced by a token bucket
//! - Fanning every worker result into one aggregator
//! - Draining live connections when a termination signal arrives
//!
//! # Example
//!
//! ```ignore
//! use connbench_core::DispatcherBuilder;
//!
//! let dispatcher = DispatcherBuilder::from_config(&config)?
//!     .connector(connector)
//!     .build()?;
//!
//! let stats = dispatcher.run_with_signal_handling(token).await?;
//! ```

mod aggregator;
mod builder;
mod executor;
mod pacer;

pub use aggregator::{AggregatedStats, ResultAggregator};
pub use builder::DispatcherBuilder;
pub use executor::Dispatcher;
pub use pacer::SpawnPacer;

#[cfg(test)]
mod tests;
