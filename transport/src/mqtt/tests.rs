//! Tests against an in-process MQTT 3.1.1 broker
//!
//! The broker speaks just enough of the protocol for the connector:
//! CONNECT, PUBLISH at every QoS, SUBSCRIBE with echo to exact topics,
//! PINGREQ and DISCONNECT.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use connbench_core::{BrokerConnector, ConnectOptions, QoS, SessionHandler, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::*;

// ============================================================================
// Fake broker
// ============================================================================

#[derive(Default)]
struct BrokerLog {
    publishes: AtomicUsize,
    client_ids: Mutex<Vec<String>>,
}

struct FakeBroker {
    url: String,
    log: Arc<BrokerLog>,
}

impl FakeBroker {
    /// Accepting broker
    async fn start() -> Self {
        Self::start_with(None).await
    }

    /// Broker answering every CONNECT with `refuse` as the CONNACK code
    async fn start_with(refuse: Option<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("mqtt://{}", listener.local_addr().unwrap());
        let log = Arc::new(BrokerLog::default());

        let accept_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_client(stream, Arc::clone(&accept_log), refuse));
            }
        });

        Self { url, log }
    }
}

async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;
    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.ok()?;
        length |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; length];
    stream.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

fn encode(header: u8, body: &[u8]) -> Vec<u8> {
    let mut packet = vec![header];
    let mut length = body.len();
    loop {
        let mut byte = (length % 128) as u8;
        length /= 128;
        if length > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if length == 0 {
            break;
        }
    }
    packet.extend_from_slice(body);
    packet
}

fn read_string(body: &[u8], at: usize) -> (String, usize) {
    let len = usize::from(u16::from_be_bytes([body[at], body[at + 1]]));
    let value = String::from_utf8_lossy(&body[at + 2..at + 2 + len]).into_owned();
    (value, at + 2 + len)
}

async fn serve_client(mut stream: TcpStream, log: Arc<BrokerLog>, refuse: Option<u8>) {
    let mut subscriptions = HashSet::new();

    while let Some((header, body)) = read_packet(&mut stream).await {
        let reply = match header >> 4 {
            // CONNECT: protocol name, level, flags, keep-alive, then client id
            1 => {
                let (_, at) = read_string(&body, 0);
                let (client_id, _) = read_string(&body, at + 4);
                log.client_ids.lock().unwrap().push(client_id);
                match refuse {
                    Some(code) => {
                        let _ = stream.write_all(&encode(0x20, &[0, code])).await;
                        return;
                    }
                    None => encode(0x20, &[0, 0]),
                }
            }
            // PUBLISH
            3 => {
                log.publishes.fetch_add(1, Ordering::SeqCst);
                let qos = (header >> 1) & 0x03;
                let (topic, mut at) = read_string(&body, 0);
                let pkid = if qos > 0 {
                    let id = [body[at], body[at + 1]];
                    at += 2;
                    Some(id)
                } else {
                    None
                };
                let payload = &body[at..];

                let mut reply = Vec::new();
                if subscriptions.contains(&topic) {
                    let mut echo = Vec::new();
                    echo.extend_from_slice(&(topic.len() as u16).to_be_bytes());
                    echo.extend_from_slice(topic.as_bytes());
                    echo.extend_from_slice(payload);
                    reply.extend(encode(0x30, &echo));
                }
                match (qos, pkid) {
                    (1, Some(id)) => reply.extend(encode(0x40, &id)),
                    (2, Some(id)) => reply.extend(encode(0x50, &id)),
                    _ => {}
                }
                reply
            }
            // PUBREL
            6 => encode(0x70, &body[..2]),
            // SUBSCRIBE: packet id, then (filter, qos) pairs
            8 => {
                let mut ack = body[..2].to_vec();
                let mut at = 2;
                while at < body.len() {
                    let (filter, next) = read_string(&body, at);
                    let qos = body[next];
                    at = next + 1;
                    if filter.starts_with("forbidden") {
                        ack.push(0x80);
                    } else {
                        ack.push(qos);
                        subscriptions.insert(filter);
                    }
                }
                encode(0x90, &ack)
            }
            // PINGREQ
            12 => encode(0xd0, &[]),
            // DISCONNECT
            14 => return,
            _ => Vec::new(),
        };

        if !reply.is_empty() && stream.write_all(&reply).await.is_err() {
            return;
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct CountingHandler {
    connects: AtomicUsize,
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl SessionHandler for CountingHandler {
    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
    }
}

fn options(url: &str, client_id: &str) -> ConnectOptions {
    ConnectOptions {
        broker_url: url.to_string(),
        client_id: client_id.to_string(),
        username: None,
        password: None,
        tls: None,
        keep_alive: Duration::from_secs(30),
        reconnect_interval: None,
    }
}

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn test_connect_sends_client_id() {
    let broker = FakeBroker::start().await;
    let handler = Arc::new(CountingHandler::default());
    let session = MqttConnector::new()
        .connect(options(&broker.url, "connbench-7-pub"), handler.clone(), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
    assert_eq!(
        broker.log.client_ids.lock().unwrap().as_slice(),
        ["connbench-7-pub".to_string()]
    );
    session.disconnect(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_refused_connack() {
    let broker = FakeBroker::start_with(Some(5)).await;
    let result = MqttConnector::new()
        .connect(
            options(&broker.url, "refused"),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(TransportError::Refused(_))));
}

#[tokio::test]
async fn test_closed_port_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("mqtt://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = MqttConnector::new()
        .connect(
            options(&url, "nobody-home"),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn test_silent_listener_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("mqtt://{}", listener.local_addr().unwrap());
    // Accept and hold connections without ever answering
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let result = MqttConnector::new()
        .connect(
            options(&url, "silent"),
            Arc::new(CountingHandler::default()),
            Duration::from_millis(200),
        )
        .await;

    assert!(matches!(result, Err(TransportError::Timeout(_))));
}

#[tokio::test]
async fn test_empty_client_id_rejected() {
    let result = MqttConnector::new()
        .connect(
            options("mqtt://127.0.0.1:1", ""),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(TransportError::Connect(msg)) if msg.contains("client id")));
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let result = MqttConnector::new()
        .connect(
            options("http://127.0.0.1:1", "c"),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_secure_url_without_tls_material() {
    let result = MqttConnector::new()
        .connect(
            options("mqtts://127.0.0.1:1", "c"),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await;

    assert!(matches!(result, Err(TransportError::Tls(_))));
}

// ============================================================================
// Publish / subscribe
// ============================================================================

#[tokio::test]
async fn test_publish_every_qos() {
    let broker = FakeBroker::start().await;
    let mut session = MqttConnector::new()
        .connect(
            options(&broker.url, "publisher"),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await
        .unwrap();

    for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
        session
            .publish("bench/topic", qos, false, b"payload".to_vec(), TIMEOUT)
            .await
            .unwrap();
    }
    // QoS 0 completes on send, so the broker may still be reading it
    assert!(broker.log.publishes.load(Ordering::SeqCst) >= 2);

    session.disconnect(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_subscribe_receives_echo() {
    let broker = FakeBroker::start().await;
    let handler = Arc::new(CountingHandler::default());
    let mut subscriber = MqttConnector::new()
        .connect(options(&broker.url, "echo"), handler.clone(), TIMEOUT)
        .await
        .unwrap();

    subscriber
        .subscribe("bench/echo", QoS::AtLeastOnce, TIMEOUT)
        .await
        .unwrap();
    subscriber
        .publish("bench/echo", QoS::AtLeastOnce, false, b"{\"id\":1}".to_vec(), TIMEOUT)
        .await
        .unwrap();

    tokio::time::timeout(TIMEOUT, async {
        while handler.messages.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let messages = handler.messages.lock().unwrap().clone();
    assert_eq!(messages[0].0, "bench/echo");
    assert_eq!(messages[0].1, b"{\"id\":1}".to_vec());
}

#[tokio::test]
async fn test_rejected_subscription() {
    let broker = FakeBroker::start().await;
    let mut session = MqttConnector::new()
        .connect(
            options(&broker.url, "rejected"),
            Arc::new(CountingHandler::default()),
            TIMEOUT,
        )
        .await
        .unwrap();

    let err = session
        .subscribe("forbidden/topic", QoS::AtMostOnce, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Subscribe(_)));
}

#[test]
fn test_keep_alive_clamped() {
    assert_eq!(keep_alive(Duration::ZERO), Duration::ZERO);
    assert_eq!(keep_alive(Duration::from_millis(10)), Duration::from_secs(1));
    assert_eq!(keep_alive(Duration::from_secs(60)), Duration::from_secs(60));
}
