//! One live rumqttc session

use std::time::Duration;

use async_trait::async_trait;
use connbench_core::{BrokerSession, QoS, TransportError};
use rumqttc::AsyncClient;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::SessionEvent;

/// Session handed to a worker by [`super::MqttConnector`]
///
/// Dropping the session stops its event loop.
pub struct MqttSession {
    client: AsyncClient,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl MqttSession {
    pub(crate) fn new(
        client: AsyncClient,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            client,
            events,
            task,
        }
    }

    /// Drop events left over from earlier operations
    fn discard_stale(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    async fn next_event(&mut self) -> Result<SessionEvent, TransportError> {
        self.events
            .recv()
            .await
            .ok_or_else(|| TransportError::ConnectionLost("event loop stopped".into()))
    }

    async fn publish_confirmed(
        &mut self,
        topic: &str,
        qos: QoS,
        retained: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.client
            .publish(topic, to_rumqttc(qos), retained, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        let pkid = loop {
            match self.next_event().await? {
                SessionEvent::Published(pkid) => break pkid,
                SessionEvent::Failed(e) => return Err(lost(e)),
                _ => {}
            }
        };
        // QoS 0 is complete once the packet has left the client
        if qos == QoS::AtMostOnce {
            return Ok(());
        }

        loop {
            match (qos, self.next_event().await?) {
                (QoS::AtLeastOnce, SessionEvent::PubAck(ack)) if ack == pkid => return Ok(()),
                (QoS::ExactlyOnce, SessionEvent::PubComp(comp)) if comp == pkid => return Ok(()),
                (_, SessionEvent::Failed(e)) => return Err(lost(e)),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retained: bool,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.discard_stale();
        tokio::time::timeout(timeout, self.publish_confirmed(topic, qos, retained, payload))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.discard_stale();
        let acknowledged = async {
            self.client
                .subscribe(topic, to_rumqttc(qos))
                .await
                .map_err(|e| TransportError::Subscribe(e.to_string()))?;
            loop {
                match self.next_event().await? {
                    SessionEvent::SubAck(_, true) => return Ok(()),
                    SessionEvent::SubAck(_, false) => {
                        return Err(TransportError::Subscribe(format!(
                            "broker rejected subscription to {topic}"
                        )))
                    }
                    SessionEvent::Failed(e) => return Err(lost(e)),
                    _ => {}
                }
            }
        };
        tokio::time::timeout(timeout, acknowledged)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn disconnect(mut self: Box<Self>, grace: Duration) -> Result<(), TransportError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()))?;

        let settled = tokio::time::timeout(grace, async {
            loop {
                match self.events.recv().await {
                    Some(SessionEvent::Disconnected) | None => return,
                    Some(_) => {}
                }
            }
        })
        .await;

        if settled.is_err() {
            return Err(TransportError::Disconnect(format!(
                "DISCONNECT not sent within {grace:?}"
            )));
        }
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for MqttSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSession")
            .field("running", &!self.task.is_finished())
            .finish()
    }
}

fn lost(error: TransportError) -> TransportError {
    match error {
        TransportError::ConnectionLost(_) => error,
        other => TransportError::ConnectionLost(other.to_string()),
    }
}

pub(crate) fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}
