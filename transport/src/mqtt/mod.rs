//! MQTT connector built on rumqttc
//!
//! Every session owns one rumqttc event loop, polled by a dedicated tokio
//! task. The task hands incoming messages straight to the worker's
//! [`SessionHandler`] and forwards protocol acknowledgements to the session
//! over an unbounded channel, where `publish`/`subscribe` wait for them.

mod session;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connbench_core::{
    BrokerConnector, BrokerSession, ConnectOptions, SessionHandler, TlsMaterial, TransportError,
};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, SubscribeReasonCode};
use rumqttc::{Outgoing, TlsConfiguration, Transport};
use tokio::sync::mpsc;

use crate::endpoint::BrokerEndpoint;
use crate::tls::build_tls_configuration;

pub use session::MqttSession;

/// Default bound on queued client requests per session
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Default maximum MQTT packet size, in bytes
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Protocol events forwarded from the event loop to its session
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    /// CONNACK accepted
    Connected,
    /// A PUBLISH left the client (packet id 0 for QoS 0)
    Published(u16),
    /// PUBACK for a QoS 1 publish
    PubAck(u16),
    /// PUBCOMP for a QoS 2 publish
    PubComp(u16),
    /// SUBACK; `true` when every filter was granted
    SubAck(u16, bool),
    /// DISCONNECT left the client
    Disconnected,
    /// The connection failed or dropped
    Failed(TransportError),
}

/// Connector producing rumqttc-backed sessions
pub struct MqttConnector {
    tls: Option<TlsConfiguration>,
    request_capacity: usize,
    max_packet_size: usize,
}

impl MqttConnector {
    /// Connector for plain or TLS brokers; TLS material comes from the connect options
    pub fn new() -> Self {
        Self {
            tls: None,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Prebuild the TLS configuration shared by every session
    ///
    /// Invalid material is reported here, before any worker connects.
    pub fn with_tls(mut self, material: &TlsMaterial) -> Result<Self, TransportError> {
        self.tls = Some(build_tls_configuration(material)?);
        Ok(self)
    }

    /// Set the per-session request queue bound
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    /// Set the maximum packet size in both directions
    pub fn with_max_packet_size(mut self, bytes: usize) -> Self {
        self.max_packet_size = bytes;
        self
    }

    fn mqtt_options(
        &self,
        endpoint: &BrokerEndpoint,
        options: &ConnectOptions,
    ) -> Result<MqttOptions, TransportError> {
        // rumqttc panics on these ids
        if options.client_id.is_empty() || options.client_id.starts_with(' ') {
            return Err(TransportError::Connect(format!(
                "invalid client id {:?}",
                options.client_id
            )));
        }

        let mut mqtt = MqttOptions::new(
            options.client_id.clone(),
            endpoint.host.clone(),
            endpoint.port,
        );
        mqtt.set_keep_alive(keep_alive(options.keep_alive));
        mqtt.set_clean_session(true);
        mqtt.set_max_packet_size(self.max_packet_size, self.max_packet_size);

        if let Some(username) = &options.username {
            mqtt.set_credentials(
                username.clone(),
                options.password.clone().unwrap_or_default(),
            );
        }

        if endpoint.secure {
            let tls = match (&self.tls, &options.tls) {
                (Some(prebuilt), _) => prebuilt.clone(),
                (None, Some(material)) => build_tls_configuration(material)?,
                (None, None) => {
                    return Err(TransportError::Tls(format!(
                        "{endpoint} requires a CA certificate or skip-verification"
                    )))
                }
            };
            mqtt.set_transport(Transport::Tls(tls));
        }

        Ok(mqtt)
    }
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MqttConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConnector")
            .field("tls", &self.tls.is_some())
            .field("request_capacity", &self.request_capacity)
            .field("max_packet_size", &self.max_packet_size)
            .finish()
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    fn transport_name(&self) -> &str {
        "mqtt"
    }

    async fn connect(
        &self,
        options: ConnectOptions,
        handler: Arc<dyn SessionHandler>,
        timeout: Duration,
    ) -> Result<Box<dyn BrokerSession>, TransportError> {
        let endpoint = BrokerEndpoint::parse(&options.broker_url)?;
        let mqtt = self.mqtt_options(&endpoint, &options)?;

        let (client, eventloop) = AsyncClient::new(mqtt, self.request_capacity);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive_event_loop(
            eventloop,
            handler,
            events_tx,
            options.reconnect_interval,
            options.client_id.clone(),
        ));

        let connected = tokio::time::timeout(timeout, async {
            loop {
                match events_rx.recv().await {
                    Some(SessionEvent::Connected) => return Ok(()),
                    Some(SessionEvent::Failed(e)) => return Err(e),
                    Some(_) => {}
                    None => {
                        return Err(TransportError::Connect("event loop stopped".into()));
                    }
                }
            }
        })
        .await;

        match connected {
            Ok(Ok(())) => {
                tracing::trace!(client_id = %options.client_id, %endpoint, "Session established");
                Ok(Box::new(MqttSession::new(client, events_rx, task)))
            }
            Ok(Err(e)) => {
                task.abort();
                Err(e)
            }
            Err(_) => {
                task.abort();
                Err(TransportError::Timeout(timeout))
            }
        }
    }
}

/// rumqttc rejects sub-second keep-alives other than zero
fn keep_alive(requested: Duration) -> Duration {
    if requested.is_zero() {
        requested
    } else {
        requested.max(Duration::from_secs(1))
    }
}

fn map_connection_error(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::ConnectionRefused(code) => TransportError::Refused(format!("{code:?}")),
        ConnectionError::Tls(e) => TransportError::Tls(e.to_string()),
        other => TransportError::Connect(other.to_string()),
    }
}

/// Poll one session's event loop until it disconnects or its session goes away
async fn drive_event_loop(
    mut eventloop: EventLoop,
    handler: Arc<dyn SessionHandler>,
    events: mpsc::UnboundedSender<SessionEvent>,
    reconnect_interval: Option<Duration>,
    client_id: String,
) {
    let mut connected = false;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected = true;
                handler.on_connect();
                SessionEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handler.on_message(&publish.topic, &publish.payload);
                continue;
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => SessionEvent::PubAck(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => SessionEvent::PubComp(comp.pkid),
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let granted = ack
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                SessionEvent::SubAck(ack.pkid, granted)
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => SessionEvent::Published(pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = events.send(SessionEvent::Disconnected);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                let error = map_connection_error(e);
                if connected {
                    connected = false;
                    handler.on_connection_lost(&error);
                }
                if events.send(SessionEvent::Failed(error)).is_err() {
                    break;
                }
                match reconnect_interval {
                    Some(interval) => {
                        tracing::trace!(%client_id, ?interval, "Reconnecting after connection error");
                        tokio::time::sleep(interval).await;
                        continue;
                    }
                    None => break,
                }
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }

    tracing::trace!(%client_id, "Event loop stopped");
}

#[cfg(test)]
mod tests;
