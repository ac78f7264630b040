//! Broker URL parsing

use connbench_core::TransportError;
use url::Url;

/// Default port for plain MQTT
pub const MQTT_PORT: u16 = 1883;

/// Default port for MQTT over TLS
pub const MQTTS_PORT: u16 = 8883;

/// Host, port and security of a broker URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Whether the connection uses TLS
    pub secure: bool,
}

impl BrokerEndpoint {
    /// Parse a broker URL
    ///
    /// Accepted schemes: `mqtt` and `tcp` (plain, port 1883 by default),
    /// `mqtts`, `ssl` and `tls` (TLS, port 8883 by default).
    pub fn parse(broker_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(broker_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{broker_url}: {e}")))?;

        let (secure, default_port) = match url.scheme() {
            "mqtt" | "tcp" => (false, MQTT_PORT),
            "mqtts" | "ssl" | "tls" => (true, MQTTS_PORT),
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "{broker_url}: unsupported scheme {other:?}"
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| TransportError::InvalidUrl(format!("{broker_url}: missing host")))?;
        // IPv6 literals come back bracketed
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
            secure,
        })
    }
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "mqtts" } else { "mqtt" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}
