//! Builder pattern for Dispatcher construction

use std::sync::Arc;
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::config::{ConfigError, LoadConfig, MAX_CLIENTS_PER_PROCESS};
use crate::counters::RunCounters;
use crate::error::{BenchError, BenchResult};
use crate::traits::BrokerConnector;
use crate::worker::WorkerConfig;

use super::executor::Dispatcher;

/// Default delay between worker spawns
pub const DEFAULT_SPAWN_INTERVAL: Duration = Duration::from_micros(50);

/// Default grace period after a termination signal
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Builder for creating a Dispatcher with proper configuration
///
/// # Example
///
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .client_count(1000)
///     .worker_config(template)
///     .connector(connector)
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    client_count: u64,
    worker_config: Option<WorkerConfig>,
    connector: Option<Arc<dyn BrokerConnector>>,
    counters: Option<Arc<RunCounters>>,
    spawn_interval: Duration,
    drain_grace: Duration,
    channel_config: ChannelConfig,
}

impl DispatcherBuilder {
    /// Create a new dispatcher builder with default settings
    pub fn new() -> Self {
        Self {
            client_count: 0,
            worker_config: None,
            connector: None,
            counters: None,
            spawn_interval: DEFAULT_SPAWN_INTERVAL,
            drain_grace: DEFAULT_DRAIN_GRACE,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Start from a validated load configuration
    pub fn from_config(config: &LoadConfig) -> Result<Self, ConfigError> {
        let template = config.worker_template()?;
        Ok(Self::new()
            .client_count(config.client_count)
            .worker_config(template)
            .spawn_interval(config.spawn_interval())
            .drain_grace(config.drain_grace())
            .channel_config(config.channel_config()))
    }

    /// Set the number of clients this process drives
    pub fn client_count(mut self, count: u64) -> Self {
        self.client_count = count;
        self
    }

    /// Set the template every worker clones its configuration from
    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = Some(config);
        self
    }

    /// Set the broker connector
    pub fn connector(mut self, connector: Arc<dyn BrokerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share run counters (a fresh set with a random message-id base otherwise)
    pub fn counters(mut self, counters: Arc<RunCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Set the delay between worker spawns (zero disables pacing)
    pub fn spawn_interval(mut self, interval: Duration) -> Self {
        self.spawn_interval = interval;
        self
    }

    /// Set the grace period after a termination signal
    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the dispatcher
    ///
    /// # Errors
    ///
    /// Returns an error if the connector or worker configuration is missing,
    /// or if the client count or result buffer is out of range.
    pub fn build(self) -> BenchResult<Dispatcher> {
        let connector = self
            .connector
            .ok_or_else(|| BenchError::missing_config("connector"))?;
        let worker_config = self
            .worker_config
            .ok_or_else(|| BenchError::missing_config("worker_config"))?;

        if self.client_count == 0 {
            return Err(ConfigError::ZeroClientCount.into());
        }
        if self.client_count > MAX_CLIENTS_PER_PROCESS {
            return Err(ConfigError::TooManyClients {
                requested: self.client_count,
                max: MAX_CLIENTS_PER_PROCESS,
            }
            .into());
        }
        if self.channel_config.result_buffer == 0 {
            return Err(ConfigError::ZeroResultBuffer.into());
        }

        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(RunCounters::with_random_base()));

        Ok(Dispatcher::new(
            self.client_count,
            worker_config,
            connector,
            counters,
            self.spawn_interval,
            self.drain_grace,
            self.channel_config,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
