//! Worker execution loop

use crate::channel::DrainReceiver;
use crate::counters::RunCounters;
use crate::traits::{BrokerConnector, BrokerSession, SessionHandler, TransportError};

use super::config::WorkerConfig;
use super::handler::WorkerHandler;
use super::stats::{WorkerResult, WorkerStats};
use super::ClientNames;

use std::sync::Arc;
use tokio::sync::mpsc;

/// Worker drives one simulated client: connect -> publish -> disconnect -> report
///
/// Workers are independent tokio tasks spawned by the Dispatcher. They share
/// the connector and run counters via Arc and report through an mpsc channel.
pub struct Worker {
    /// Worker id inside the assigned range
    id: u64,

    /// Owned copy of the run configuration
    config: WorkerConfig,

    /// Topic and client ids resolved from the templates
    names: ClientNames,

    /// Transport (shared across workers via Arc)
    connector: Arc<dyn BrokerConnector>,

    /// Channel sender for the final result
    results_tx: mpsc::Sender<WorkerResult>,

    /// Run-wide message id and publish counters
    counters: Arc<RunCounters>,
}

impl Worker {
    /// Create a new worker
    pub fn new(
        id: u64,
        config: WorkerConfig,
        connector: Arc<dyn BrokerConnector>,
        results_tx: mpsc::Sender<WorkerResult>,
        counters: Arc<RunCounters>,
    ) -> Self {
        let names = config.naming.resolve(id);
        Self {
            id,
            config,
            names,
            connector,
            results_tx,
            counters,
        }
    }

    /// Run the worker to completion
    ///
    /// Always produces exactly one result, which is sent to the result channel
    /// and also returned. A closed result channel is not an error.
    pub async fn run(self, drain: DrainReceiver) -> WorkerResult {
        tracing::debug!(
            worker_id = self.id,
            topic = %self.names.topic,
            publisher_id = %self.names.publisher_id,
            "Worker started"
        );

        let result = self.execute(&drain).await;

        tracing::debug!(
            worker_id = self.id,
            event = result.event.as_str(),
            published = result.messages_published,
            failed = result.publish_failures,
            received = result.messages_received,
            drained = result.drained,
            publish_ms = result.publish_time.as_millis() as u64,
            "Worker finished"
        );

        if self.results_tx.send(result.clone()).await.is_err() {
            tracing::debug!(worker_id = self.id, "Result channel closed, result dropped");
        }
        result
    }

    async fn execute(&self, drain: &DrainReceiver) -> WorkerResult {
        let handler = Arc::new(WorkerHandler::new(self.id, self.names.topic.clone()));
        let session_handler: Arc<dyn SessionHandler> = handler.clone();

        let subscriber = if self.config.subscribe {
            match self.open_subscriber(Arc::clone(&session_handler)).await {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::debug!(worker_id = self.id, error = %e, "Subscriber setup failed");
                    return WorkerResult::connect_failed(self.id, e.to_string());
                }
            }
        } else {
            None
        };

        let options = self.config.connect_options(&self.names.publisher_id);
        let mut publisher = match self
            .connector
            .connect(options, session_handler, self.config.timeout)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(worker_id = self.id, error = %e, "Connect failed");
                if let Some(session) = subscriber {
                    self.close(session, "subscriber").await;
                }
                return WorkerResult::connect_failed(self.id, e.to_string());
            }
        };

        let mut stats = WorkerStats::new();
        let mut drained = self.publish_loop(publisher.as_mut(), &mut stats, drain).await;

        if subscriber.is_some() && !drained {
            tokio::select! {
                biased;

                Some(_) = drain.recv() => drained = true,

                reached = handler.wait_for(stats.published, self.config.timeout) => {
                    if !reached {
                        tracing::debug!(
                            worker_id = self.id,
                            expected = stats.published,
                            received = handler.received(),
                            "Echo wait timed out"
                        );
                    }
                }
            }
        }

        let receive_time = if subscriber.is_some() {
            handler
                .last_received()
                .zip(stats.started_at)
                .map(|(last, start)| last.saturating_duration_since(start))
                .unwrap_or_default()
        } else {
            stats.elapsed().unwrap_or_default()
        };

        if self.config.hold_until_drain && !drained {
            tracing::trace!(worker_id = self.id, "Holding connection until drained");
            drained = drain.recv().await.is_some();
        }

        stats.received = handler.received();
        stats.connection_losses = handler.connection_losses();

        self.close(publisher, "publisher").await;
        if let Some(session) = subscriber {
            self.close(session, "subscriber").await;
        }

        WorkerResult::completed(self.id, &stats, receive_time, drained)
    }

    /// Publish `messages` payloads; returns whether a drain token ended the loop
    async fn publish_loop(
        &self,
        session: &mut dyn BrokerSession,
        stats: &mut WorkerStats,
        drain: &DrainReceiver,
    ) -> bool {
        let mut drained = false;
        stats.start();

        for index in 0..self.config.messages {
            // Drain is only honoured between publishes
            if drain.try_recv().is_some() {
                drained = true;
                break;
            }

            let message_id = self.counters.next_message_id();
            let payload = self.config.payload.generate(index);
            match session
                .publish(
                    &self.names.topic,
                    self.config.publisher_qos,
                    self.config.retained,
                    payload,
                    self.config.timeout,
                )
                .await
            {
                Ok(()) => {
                    stats.record_published(message_id);
                    self.counters.record_published();
                }
                Err(e) => {
                    stats.record_failure(message_id);
                    tracing::debug!(
                        worker_id = self.id,
                        message_id,
                        error = %e,
                        "Publish failed"
                    );
                }
            }

            if self.config.pause.is_zero() || index + 1 == self.config.messages {
                continue;
            }

            tokio::select! {
                biased;

                Some(_) = drain.recv() => {
                    drained = true;
                    break;
                }

                _ = tokio::time::sleep(self.config.pause) => {}
            }
        }

        stats.stop();
        drained
    }

    async fn open_subscriber(
        &self,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Box<dyn BrokerSession>, TransportError> {
        let options = self.config.connect_options(&self.names.subscriber_id);
        let mut session = self
            .connector
            .connect(options, handler, self.config.timeout)
            .await?;

        if let Err(e) = session
            .subscribe(
                &self.names.topic,
                self.config.subscriber_qos,
                self.config.timeout,
            )
            .await
        {
            self.close(session, "subscriber").await;
            return Err(e);
        }
        Ok(session)
    }

    async fn close(&self, session: Box<dyn BrokerSession>, role: &'static str) {
        if let Err(e) = session.disconnect(self.config.disconnect_grace).await {
            tracing::warn!(worker_id = self.id, role, error = %e, "Disconnect failed");
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolved topic and client ids
    pub fn names(&self) -> &ClientNames {
        &self.names
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("transport", &self.connector.transport_name())
            .field("topic", &self.names.topic)
            .field("messages", &self.config.messages)
            .field("subscribe", &self.config.subscribe)
            .field("hold_until_drain", &self.config.hold_until_drain)
            .finish()
    }
}
