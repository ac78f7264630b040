//! connbench-core: load orchestration engine for MQTT broker capacity tests
//!
//! This crate owns everything between "a process was handed a start token" and
//! "a report of what every simulated client did":
//!
//! - Start tokens and the client-id range they assign to a process
//! - Payload generation for published messages
//! - Connection workers (connect -> publish/subscribe loop -> disconnect)
//! - The dispatcher that ramps workers up and aggregates their results
//! - The drain protocol used to tear down live connections on shutdown
//!
//! The MQTT wire protocol itself lives behind the [`BrokerConnector`] trait;
//! see the `connbench-transport` crate for the rumqttc implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod payload;
pub mod shutdown;
pub mod token;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub(crate) mod mock;

pub use channel::{
    ChannelConfig, DisconnectSignal, DrainChannel, DrainReceiver, DrainSendError, DrainSender,
};
pub use config::{ConfigError, LoadConfig, TlsMaterial, MAX_CLIENTS_PER_PROCESS};
pub use counters::RunCounters;
pub use error::{BenchError, BenchResult};
pub use metrics::{LatencyHistogram, LatencyPercentiles, RateSummary};
pub use orchestrator::{
    AggregatedStats, Dispatcher, DispatcherBuilder, ResultAggregator, SpawnPacer,
};
pub use payload::PayloadGenerator;
pub use shutdown::{wait_for_termination, ShutdownCoordinator};
pub use token::{Assignment, StartToken};
pub use traits::{
    BrokerConnector, BrokerSession, ConnectOptions, QoS, SessionHandler, TransportError,
};
pub use worker::{
    ClientNames, NamingTemplates, Worker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerResult,
    WorkerStats,
};
