//! MQTT transport for connbench
//!
//! Implements the core [`BrokerConnector`](connbench_core::BrokerConnector)
//! seam on top of rumqttc: broker URL parsing, TLS configuration, and one
//! event loop task per client session.
//!
//! ```ignore
//! let connector = MqttConnector::new().with_tls(&material)?;
//! let dispatcher = DispatcherBuilder::from_config(&config)?
//!     .connector(Arc::new(connector))
//!     .build()?;
//! ```

#![warn(missing_docs)]

pub mod endpoint;
pub mod mqtt;
pub mod tls;

pub use endpoint::BrokerEndpoint;
pub use mqtt::{MqttConnector, MqttSession, DEFAULT_MAX_PACKET_SIZE, DEFAULT_REQUEST_CAPACITY};
pub use tls::{build_client_config, build_tls_configuration};
