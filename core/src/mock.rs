//! In-memory broker used by worker and orchestrator tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{
    BrokerConnector, BrokerSession, ConnectOptions, QoS, SessionHandler, TransportError,
};

// ============================================================================
// Shared broker state
// ============================================================================

#[derive(Default)]
pub(crate) struct MockBroker {
    pub connects: AtomicUsize,
    pub publishes: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub live_sessions: AtomicUsize,
    subscribers: Mutex<HashMap<String, Vec<Arc<dyn SessionHandler>>>>,
    client_ids: Mutex<Vec<String>>,
}

impl MockBroker {
    fn deliver(&self, topic: &str, payload: &[u8]) {
        let handlers = match self.subscribers.lock() {
            Ok(map) => map.get(topic).cloned().unwrap_or_default(),
            Err(_) => return,
        };
        for handler in handlers {
            handler.on_message(topic, payload);
        }
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.client_ids.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

// ============================================================================
// Mock Connector
// ============================================================================

pub(crate) struct MockConnector {
    pub broker: Arc<MockBroker>,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    publish_delay: Option<Duration>,
    fail_every: Option<usize>,
    fail_subscribe: bool,
    echo: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(MockBroker::default()),
            fail_connect: false,
            connect_delay: None,
            publish_delay: None,
            fail_every: None,
            fail_subscribe: false,
            echo: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay);
        self
    }

    /// Every n-th publish of a session fails
    pub fn with_fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    pub fn with_failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    fn transport_name(&self) -> &str {
        "mock"
    }

    async fn connect(
        &self,
        options: ConnectOptions,
        handler: Arc<dyn SessionHandler>,
        timeout: Duration,
    ) -> Result<Box<dyn BrokerSession>, TransportError> {
        self.broker.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.connect_delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        if self.fail_connect {
            return Err(TransportError::Connect(format!(
                "{}: connection refused",
                options.broker_url
            )));
        }

        if let Ok(mut ids) = self.broker.client_ids.lock() {
            ids.push(options.client_id.clone());
        }
        self.broker.live_sessions.fetch_add(1, Ordering::SeqCst);
        handler.on_connect();

        Ok(Box::new(MockSession {
            broker: Arc::clone(&self.broker),
            handler,
            publish_delay: self.publish_delay,
            fail_every: self.fail_every,
            fail_subscribe: self.fail_subscribe,
            echo: self.echo,
            published: 0,
        }))
    }
}

// ============================================================================
// Mock Session
// ============================================================================

struct MockSession {
    broker: Arc<MockBroker>,
    handler: Arc<dyn SessionHandler>,
    publish_delay: Option<Duration>,
    fail_every: Option<usize>,
    fail_subscribe: bool,
    echo: bool,
    published: usize,
}

#[async_trait]
impl BrokerSession for MockSession {
    async fn publish(
        &mut self,
        topic: &str,
        _qos: QoS,
        _retained: bool,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.broker.publishes.fetch_add(1, Ordering::SeqCst);
        self.published += 1;

        if let Some(delay) = self.publish_delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }

        if let Some(n) = self.fail_every {
            if self.published % n == 0 {
                return Err(TransportError::Publish("simulated failure".into()));
            }
        }

        if self.echo {
            self.broker.deliver(topic, &payload);
        }
        Ok(())
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        _qos: QoS,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.broker.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe {
            return Err(TransportError::Subscribe("not authorized".into()));
        }
        if let Ok(mut map) = self.broker.subscribers.lock() {
            map.entry(topic.to_string())
                .or_default()
                .push(Arc::clone(&self.handler));
        }
        Ok(())
    }

    async fn disconnect(self: Box<Self>, _grace: Duration) -> Result<(), TransportError> {
        self.broker.disconnects.fetch_add(1, Ordering::SeqCst);
        self.broker.live_sessions.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
