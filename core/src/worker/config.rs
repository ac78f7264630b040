//! Per-worker configuration

use std::sync::Arc;
use std::time::Duration;

use crate::config::TlsMaterial;
use crate::payload::PayloadGenerator;
use crate::traits::{ConnectOptions, QoS};

use super::NamingTemplates;

/// Everything one worker needs to run its client lifecycle
///
/// The dispatcher builds a template once from [`crate::LoadConfig`] and hands
/// every worker its own clone. TLS material and file payloads are behind
/// `Arc`, so cloning stays cheap with many thousands of workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Broker URL
    pub broker_url: String,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// TLS material, `None` for plain TCP
    pub tls: Option<Arc<TlsMaterial>>,
    /// Messages to publish
    pub messages: usize,
    /// Timeout for connect, publish and subscribe
    pub timeout: Duration,
    /// Pause between publishes
    pub pause: Duration,
    /// QoS for publishes
    pub publisher_qos: QoS,
    /// QoS for the echo subscription
    pub subscriber_qos: QoS,
    /// Retained flag on publishes
    pub retained: bool,
    /// Subscribe to the own topic and count echoes
    pub subscribe: bool,
    /// Keep the connection after the loop until drained
    pub hold_until_drain: bool,
    /// MQTT keep-alive
    pub keep_alive: Duration,
    /// Reconnect interval, `None` disables auto-reconnect
    pub reconnect_interval: Option<Duration>,
    /// Grace given to each disconnect
    pub disconnect_grace: Duration,
    /// Topic and client-id templates
    pub naming: NamingTemplates,
    /// Payload source
    pub payload: PayloadGenerator,
}

impl WorkerConfig {
    /// Connect options for one session of this worker
    pub fn connect_options(&self, client_id: &str) -> ConnectOptions {
        ConnectOptions {
            broker_url: self.broker_url.clone(),
            client_id: client_id.to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls.clone(),
            keep_alive: self.keep_alive,
            reconnect_interval: self.reconnect_interval,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            username: None,
            password: None,
            tls: None,
            messages: 10,
            timeout: Duration::from_secs(5),
            pause: Duration::from_millis(100),
            publisher_qos: QoS::AtMostOnce,
            subscriber_qos: QoS::AtMostOnce,
            retained: false,
            subscribe: false,
            hold_until_drain: false,
            keep_alive: Duration::from_secs(300),
            reconnect_interval: Some(Duration::from_secs(30)),
            disconnect_grace: Duration::from_millis(100),
            naming: NamingTemplates::default(),
            payload: PayloadGenerator::Default,
        }
    }
}
