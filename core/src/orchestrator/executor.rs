//! Dispatcher execution logic

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::{ChannelConfig, DrainChannel, DrainReceiver};
use crate::counters::RunCounters;
use crate::error::{BenchError, BenchResult};
use crate::shutdown::{wait_for_termination, ShutdownCoordinator};
use crate::token::{Assignment, StartToken};
use crate::traits::BrokerConnector;
use crate::worker::{WorkerBuilder, WorkerConfig, WorkerResult};

use super::aggregator::{AggregatedStats, ResultAggregator};
use super::pacer::SpawnPacer;

/// Dispatcher manages one process's share of a load run
///
/// Responsible for spawning workers over the assigned id range, draining
/// them on shutdown, and collecting their results.
pub struct Dispatcher {
    /// Clients driven by this process
    pub(crate) client_count: u64,

    /// Template cloned into every worker
    pub(crate) worker_config: WorkerConfig,

    /// Transport (shared across workers)
    pub(crate) connector: Arc<dyn BrokerConnector>,

    /// Run-wide counters
    pub(crate) counters: Arc<RunCounters>,

    /// Delay between spawns
    pub(crate) spawn_interval: Duration,

    /// Result collection window after a termination signal
    pub(crate) drain_grace: Duration,

    /// Channel sizes
    pub(crate) channel_config: ChannelConfig,
}

impl Dispatcher {
    /// Create a new dispatcher
    ///
    /// Use `DispatcherBuilder` for a more ergonomic construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_count: u64,
        worker_config: WorkerConfig,
        connector: Arc<dyn BrokerConnector>,
        counters: Arc<RunCounters>,
        spawn_interval: Duration,
        drain_grace: Duration,
        channel_config: ChannelConfig,
    ) -> Self {
        Self {
            client_count,
            worker_config,
            connector,
            counters,
            spawn_interval,
            drain_grace,
            channel_config,
        }
    }

    /// Clients driven by this process
    pub fn client_count(&self) -> u64 {
        self.client_count
    }

    /// Run-wide counters, readable while the run is in progress
    pub fn counters(&self) -> Arc<RunCounters> {
        Arc::clone(&self.counters)
    }

    /// Id range and ramp delay for a start token
    pub fn assignment(&self, token: StartToken) -> BenchResult<Assignment> {
        Ok(token.assignment(self.client_count)?)
    }

    /// Run until every worker has reported
    pub async fn run(&self, token: StartToken) -> BenchResult<AggregatedStats> {
        self.run_until(token, std::future::pending::<()>()).await
    }

    /// Run with termination signal handling
    ///
    /// SIGINT, SIGTERM and SIGQUIT (Ctrl+C elsewhere) drain every worker.
    pub async fn run_with_signal_handling(&self, token: StartToken) -> BenchResult<AggregatedStats> {
        self.run_until(token, async {
            let signal = wait_for_termination().await;
            tracing::info!(signal, "Received termination signal, draining workers...");
        })
        .await
    }

    /// Run until every worker has reported or `shutdown` resolves
    ///
    /// When `shutdown` resolves, one drain token per worker slot is queued,
    /// spawning stops, and results are collected for at most the drain grace
    /// period before the aggregate is returned.
    pub async fn run_until<F>(&self, token: StartToken, shutdown: F) -> BenchResult<AggregatedStats>
    where
        F: Future<Output = ()>,
    {
        let assignment = self.assignment(token)?;
        let slots = usize::try_from(self.client_count)
            .map_err(|_| BenchError::orchestration("client count exceeds address space"))?;

        let (drain_tx, drain_rx) = DrainChannel::new(slots);
        let (results_tx, mut results_rx) = mpsc::channel(self.channel_config.result_buffer);
        let coordinator = ShutdownCoordinator::new(drain_tx, slots, self.drain_grace);
        let mut aggregator = ResultAggregator::new(self.client_count, Arc::clone(&self.counters));

        tracing::info!(
            first_id = assignment.ids.start,
            client_count = assignment.len(),
            ramp_delay_secs = assignment.ramp_delay.as_secs(),
            transport = self.connector.transport_name(),
            "Starting load run"
        );

        tokio::pin!(shutdown);

        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Shutdown during ramp delay, no workers spawned");
                aggregator.mark_interrupted();
                return Ok(aggregator.finish());
            }

            _ = tokio::time::sleep(assignment.ramp_delay) => {}
        }

        aggregator.start();
        let spawner = tokio::spawn(spawn_workers(
            assignment.ids.clone(),
            self.worker_config.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.counters),
            results_tx,
            drain_rx,
            SpawnPacer::new(self.spawn_interval),
        ));

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    spawner.abort();
                    aggregator.mark_interrupted();
                    coordinator.drain();
                    collect_for(&mut results_rx, &mut aggregator, coordinator.grace()).await;
                    break;
                }

                result = results_rx.recv() => match result {
                    Some(result) => {
                        aggregator.record(result);
                        if aggregator.is_complete() {
                            break;
                        }
                    }
                    // Every sender is gone: spawner finished and all workers reported or died
                    None => break,
                }
            }
        }

        let stats = aggregator.finish();
        tracing::info!(
            reported = stats.reported_workers,
            completed = stats.completed_workers,
            connect_failed = stats.connect_failures,
            drained = stats.drained_workers,
            published = stats.messages_published,
            received = stats.messages_received,
            throughput = stats.throughput,
            interrupted = stats.interrupted,
            "Load run finished"
        );

        Ok(stats)
    }
}

/// Collect results until the window closes, every worker reported, or all senders are gone
async fn collect_for(
    results_rx: &mut mpsc::Receiver<WorkerResult>,
    aggregator: &mut ResultAggregator,
    window: Duration,
) {
    let deadline = tokio::time::Instant::now() + window;
    while !aggregator.is_complete() {
        match tokio::time::timeout_at(deadline, results_rx.recv()).await {
            Ok(Some(result)) => {
                aggregator.record(result);
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    reported = aggregator.reported(),
                    "Drain grace period elapsed before every worker reported"
                );
                break;
            }
        }
    }
}

async fn spawn_workers(
    ids: Range<u64>,
    template: WorkerConfig,
    connector: Arc<dyn BrokerConnector>,
    counters: Arc<RunCounters>,
    results_tx: mpsc::Sender<WorkerResult>,
    drain_rx: DrainReceiver,
    pacer: SpawnPacer,
) {
    let total = ids.end - ids.start;
    for worker_id in ids {
        pacer.wait().await;

        let worker = match WorkerBuilder::new(worker_id)
            .config(template.clone())
            .connector(Arc::clone(&connector))
            .results_tx(results_tx.clone())
            .counters(Arc::clone(&counters))
            .build()
        {
            Ok(worker) => worker,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Failed to build worker");
                return;
            }
        };

        tokio::spawn(worker.run(drain_rx.clone()));
    }
    tracing::debug!(workers = total, "All workers spawned");
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("client_count", &self.client_count)
            .field("transport", &self.connector.transport_name())
            .field("spawn_interval", &self.spawn_interval)
            .field("drain_grace", &self.drain_grace)
            .finish()
    }
}
