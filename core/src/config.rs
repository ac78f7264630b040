//! Load run configuration
//!
//! [`LoadConfig`] is the serializable, file- and CLI-facing description of a
//! load run. [`LoadConfig::validate`] performs every fatal configuration check
//! so a bad run aborts before the first worker is spawned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::payload::PayloadGenerator;
use crate::traits::QoS;
use crate::worker::{NamingTemplates, WorkerConfig, ID_PLACEHOLDER};

/// Upper bound on clients driven by one process
///
/// Every client slot also holds one drain token, so this bounds the drain
/// channel as well.
pub const MAX_CLIENTS_PER_PROCESS: u64 = 1_000_000;

/// Load run configuration
///
/// Defines which broker to hit, how many clients this process drives, and
/// what each client does once connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Broker URL (`mqtt://host:1883`, `mqtts://host:8883`)
    pub broker_url: String,

    /// Start coordinator URL handing out start tokens
    pub token_url: String,

    /// Clients driven by this process (`M`)
    pub client_count: u64,

    /// Messages each client publishes
    pub messages_per_client: usize,

    /// Per-operation timeout (connect, publish, subscribe) in milliseconds
    pub timeout_ms: u64,

    /// Pause between publishes in milliseconds
    pub pause_ms: u64,

    /// QoS for publishes
    pub publisher_qos: QoS,

    /// QoS for the echo subscription
    pub subscriber_qos: QoS,

    /// Publish with the retained flag
    pub retained: bool,

    /// Subscribe to the worker's own topic and count echoed messages
    pub subscribe: bool,

    /// Keep connections open after publishing until a drain signal arrives
    pub hold_until_drain: bool,

    /// Username for broker authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password for broker authentication
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// PEM file with the CA certificate(s) used to verify the broker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// PEM file with the client certificate chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// PEM file with the client private key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Accept any broker certificate
    pub skip_tls_verify: bool,

    /// Payload source: unset for the default text, `@path` for a file, anything else verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Topic template, `{id}` is replaced with the worker id
    pub topic_template: String,

    /// Publisher client-id template
    pub publisher_id_template: String,

    /// Subscriber client-id template
    pub subscriber_id_template: String,

    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,

    /// Let the client library reconnect dropped sessions
    pub auto_reconnect: bool,

    /// Delay between reconnect attempts in seconds
    pub reconnect_interval_secs: u64,

    /// Delay between worker spawns in microseconds
    pub spawn_interval_us: u64,

    /// Grace given to each disconnect in milliseconds
    pub disconnect_grace_ms: u64,

    /// Grace period after a shutdown signal before the process exits, in seconds
    pub drain_grace_secs: u64,

    /// Result channel buffer (workers -> aggregator)
    pub result_buffer: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        let naming = NamingTemplates::default();
        Self {
            broker_url: String::new(),
            token_url: String::new(),
            client_count: 0,
            messages_per_client: 10,
            timeout_ms: 5_000,
            pause_ms: 100,
            publisher_qos: QoS::AtMostOnce,
            subscriber_qos: QoS::AtMostOnce,
            retained: false,
            subscribe: false,
            hold_until_drain: false,
            username: None,
            password: None,
            ca_file: None,
            cert_file: None,
            key_file: None,
            skip_tls_verify: false,
            payload: None,
            topic_template: naming.topic,
            publisher_id_template: naming.publisher_id,
            subscriber_id_template: naming.subscriber_id,
            keep_alive_secs: 300,
            auto_reconnect: true,
            reconnect_interval_secs: 30,
            spawn_interval_us: 50,
            disconnect_grace_ms: 100,
            drain_grace_secs: 5,
            result_buffer: ChannelConfig::default().result_buffer,
        }
    }
}

impl LoadConfig {
    /// Load a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_url.trim().is_empty() {
            return Err(ConfigError::MissingBrokerUrl);
        }
        if self.token_url.trim().is_empty() {
            return Err(ConfigError::MissingTokenUrl);
        }
        if self.client_count == 0 {
            return Err(ConfigError::ZeroClientCount);
        }
        if self.client_count > MAX_CLIENTS_PER_PROCESS {
            return Err(ConfigError::TooManyClients {
                requested: self.client_count,
                max: MAX_CLIENTS_PER_PROCESS,
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.result_buffer == 0 {
            return Err(ConfigError::ZeroResultBuffer);
        }

        for (field, template) in [
            ("topic_template", &self.topic_template),
            ("publisher_id_template", &self.publisher_id_template),
            ("subscriber_id_template", &self.subscriber_id_template),
        ] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(ConfigError::InvalidTemplate {
                    field,
                    template: template.clone(),
                });
            }
        }
        if self.subscribe && self.publisher_id_template == self.subscriber_id_template {
            return Err(ConfigError::InvalidTemplate {
                field: "subscriber_id_template",
                template: self.subscriber_id_template.clone(),
            });
        }

        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ConfigError::IncompleteClientAuth);
        }
        if self.uses_tls() && self.ca_file.is_none() && !self.skip_tls_verify {
            return Err(ConfigError::TlsMaterial(
                "TLS broker URL needs a CA file or skip_tls_verify".into(),
            ));
        }

        Ok(())
    }

    /// Whether the broker URL selects a TLS transport
    pub fn uses_tls(&self) -> bool {
        matches!(
            self.broker_url.split_once("://").map(|(scheme, _)| scheme),
            Some("mqtts" | "ssl" | "tls")
        )
    }

    /// Read the TLS material files, if any are configured
    pub fn tls_material(&self) -> Result<Option<TlsMaterial>, ConfigError> {
        if self.ca_file.is_none() && self.cert_file.is_none() && !self.skip_tls_verify {
            return Ok(None);
        }

        let ca = self.ca_file.as_deref().map(read_pem).transpose()?;
        let client_auth = match (self.cert_file.as_deref(), self.key_file.as_deref()) {
            (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteClientAuth),
        };

        Ok(Some(TlsMaterial {
            ca,
            client_auth,
            skip_verification: self.skip_tls_verify,
        }))
    }

    /// Build the template every worker's configuration is cloned from
    ///
    /// Loads the payload file and TLS material, so this is where unreadable
    /// files turn into configuration errors.
    pub fn worker_template(&self) -> Result<WorkerConfig, ConfigError> {
        self.validate()?;

        let payload = PayloadGenerator::from_source(self.payload.as_deref())?;
        let tls = self.tls_material()?.map(Arc::new);

        Ok(WorkerConfig {
            broker_url: self.broker_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            tls,
            messages: self.messages_per_client,
            timeout: Duration::from_millis(self.timeout_ms),
            pause: Duration::from_millis(self.pause_ms),
            publisher_qos: self.publisher_qos,
            subscriber_qos: self.subscriber_qos,
            retained: self.retained,
            subscribe: self.subscribe,
            hold_until_drain: self.hold_until_drain,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect_interval: self
                .auto_reconnect
                .then(|| Duration::from_secs(self.reconnect_interval_secs.max(1))),
            disconnect_grace: Duration::from_millis(self.disconnect_grace_ms),
            naming: NamingTemplates {
                topic: self.topic_template.clone(),
                publisher_id: self.publisher_id_template.clone(),
                subscriber_id: self.subscriber_id_template.clone(),
            },
            payload,
        })
    }

    /// Channel sizing derived from this configuration
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default().with_result_buffer(self.result_buffer)
    }

    /// Spawn pacing interval
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_micros(self.spawn_interval_us)
    }

    /// Shutdown grace period
    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::File {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(ConfigError::TlsMaterial(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(bytes)
}

/// PEM-encoded TLS material shared by every worker of a run
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// CA certificate(s) used to verify the broker
    pub ca: Option<Vec<u8>>,
    /// Client certificate chain and private key
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
    /// Accept any broker certificate
    pub skip_verification: bool,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_bytes", &self.ca.as_ref().map(Vec::len))
            .field("client_auth", &self.client_auth.is_some())
            .field("skip_verification", &self.skip_verification)
            .finish()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Broker URL not set
    #[error("broker URL not available")]
    MissingBrokerUrl,

    /// Token service URL not set
    #[error("token URL not available")]
    MissingTokenUrl,

    /// Client count of zero
    #[error("client count must be at least 1")]
    ZeroClientCount,

    /// Client count above the per-process bound
    #[error("client count {requested} exceeds the per-process maximum of {max}")]
    TooManyClients {
        /// Requested client count
        requested: u64,
        /// Allowed maximum
        max: u64,
    },

    /// Operation timeout of zero
    #[error("timeout must be positive")]
    ZeroTimeout,

    /// Result buffer of zero
    #[error("result buffer must be at least 1")]
    ZeroResultBuffer,

    /// Naming template without an id placeholder, or clashing templates
    #[error("{field} must contain {{id}} and be unique, got {template:?}")]
    InvalidTemplate {
        /// Offending field
        field: &'static str,
        /// Template value
        template: String,
    },

    /// Only one of client certificate and key was supplied
    #[error("client certificate and key must be supplied together")]
    IncompleteClientAuth,

    /// TLS material is missing or unusable
    #[error("invalid TLS material: {0}")]
    TlsMaterial(String),

    /// Payload file could not be read
    #[error("error reading payload file {path}: {source}")]
    PayloadFile {
        /// Path of the payload file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A configuration or TLS file could not be read
    #[error("error reading {path}: {source}")]
    File {
        /// Path of the file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A configuration file could not be parsed
    #[error("error parsing {path}: {message}")]
    Parse {
        /// Path of the file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Start token would assign ids past `u64::MAX`
    #[error("client range overflows: client_start {client_start} * client_count {client_count}")]
    RangeOverflow {
        /// Token offset
        client_start: u64,
        /// Configured client count
        client_count: u64,
    },
}
