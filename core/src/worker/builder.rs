//! Builder pattern for Worker construction

use crate::counters::RunCounters;
use crate::error::{BenchError, BenchResult};
use crate::traits::BrokerConnector;

use super::config::WorkerConfig;
use super::executor::Worker;
use super::stats::WorkerResult;

use std::sync::Arc;
use tokio::sync::mpsc;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .config(config)
///     .connector(connector)
///     .results_tx(tx)
///     .build()?;
/// ```
pub struct WorkerBuilder {
    id: u64,
    config: Option<WorkerConfig>,
    connector: Option<Arc<dyn BrokerConnector>>,
    results_tx: Option<mpsc::Sender<WorkerResult>>,
    counters: Option<Arc<RunCounters>>,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: u64) -> Self {
        Self {
            id,
            config: None,
            connector: None,
            results_tx: None,
            counters: None,
        }
    }

    /// Set the worker configuration
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the broker connector
    pub fn connector(mut self, connector: Arc<dyn BrokerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the result channel sender
    pub fn results_tx(mut self, tx: mpsc::Sender<WorkerResult>) -> Self {
        self.results_tx = Some(tx);
        self
    }

    /// Share run-wide counters (a private set is created otherwise)
    pub fn counters(mut self, counters: Arc<RunCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if any required field is missing.
    pub fn build(self) -> BenchResult<Worker> {
        let config = self.config.ok_or(BenchError::missing_config("config"))?;
        let connector = self
            .connector
            .ok_or(BenchError::missing_config("connector"))?;
        let results_tx = self
            .results_tx
            .ok_or(BenchError::missing_config("results_tx"))?;
        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(RunCounters::default()));

        Ok(Worker::new(self.id, config, connector, results_tx, counters))
    }
}
