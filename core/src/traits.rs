//! Core traits for broker transports
//!
//! These traits are defined in core so the engine never depends on a concrete
//! MQTT client. Implementations live in the `connbench-transport` crate; tests
//! use in-memory mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TlsMaterial;

// ============================================================================
// Quality of Service
// ============================================================================

/// Delivery guarantee requested for a publish or subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// Fire and forget (0)
    #[default]
    AtMostOnce,
    /// Acknowledged delivery (1)
    AtLeastOnce,
    /// Assured single delivery (2)
    ExactlyOnce,
}

impl QoS {
    /// Numeric level as used on the wire
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("QoS must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.level()
    }
}

// ============================================================================
// Session callbacks
// ============================================================================

/// Callbacks a transport invokes for one client session
///
/// Each worker supplies its own implementation; the transport calls these
/// synchronously from its event loop, so implementations must not block.
pub trait SessionHandler: Send + Sync {
    /// The broker accepted the connection (also fires after a reconnect)
    fn on_connect(&self) {}

    /// A message arrived on a subscribed topic
    fn on_message(&self, topic: &str, payload: &[u8]);

    /// The connection dropped; auto-reconnect may follow
    fn on_connection_lost(&self, _error: &TransportError) {}
}

// ============================================================================
// Connector / Session
// ============================================================================

/// Everything a transport needs to open one client session
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker URL, e.g. `mqtts://broker.example.com:8883`
    pub broker_url: String,
    /// MQTT client identifier
    pub client_id: String,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// TLS material shared by every worker of a run
    pub tls: Option<Arc<TlsMaterial>>,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Reconnect interval when auto-reconnect is enabled, `None` disables it
    pub reconnect_interval: Option<Duration>,
}

/// Factory for broker sessions
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Transport identifier (e.g. "mqtt")
    fn transport_name(&self) -> &str;

    /// Open a session and wait for the broker to accept it
    ///
    /// Must give up with [`TransportError::Timeout`] once `timeout` elapses.
    async fn connect(
        &self,
        options: ConnectOptions,
        handler: Arc<dyn SessionHandler>,
        timeout: Duration,
    ) -> Result<Box<dyn BrokerSession>, TransportError>;
}

/// One live client session
#[async_trait]
pub trait BrokerSession: Send {
    /// Publish one message and wait for the delivery confirmation matching `qos`
    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retained: bool,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Subscribe to a topic filter and wait for the broker's acknowledgement
    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Disconnect, giving in-flight traffic up to `grace` to settle
    async fn disconnect(self: Box<Self>, grace: Duration) -> Result<(), TransportError>;
}

/// Transport-level errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Operation did not complete in time
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Broker URL could not be used
    #[error("invalid broker URL: {0}")]
    InvalidUrl(String),

    /// TLS material was rejected
    #[error("TLS error: {0}")]
    Tls(String),

    /// Network-level connect failure
    #[error("connect failed: {0}")]
    Connect(String),

    /// Broker refused the connection
    #[error("connection refused by broker: {0}")]
    Refused(String),

    /// Publish could not be handed to the client
    #[error("publish failed: {0}")]
    Publish(String),

    /// Subscribe failed or was rejected
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Disconnect failed
    #[error("disconnect failed: {0}")]
    Disconnect(String),

    /// Connection was lost while the session was in use
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}
