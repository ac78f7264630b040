//! CLI argument parsing and command dispatch

mod report;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use connbench_coordinator::{CoordinatorConfig, TokenClient};
use connbench_core::{wait_for_termination, DispatcherBuilder, LoadConfig, QoS};
use connbench_transport::MqttConnector;

use report::RunReport;

/// connbench - distributed connection and throughput load harness for MQTT brokers
#[derive(Parser, Debug)]
#[command(name = "connbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable per-worker debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve start tokens to load generators
    Coordinator(CoordinatorArgs),
    /// Fetch a start token and drive this process's share of clients
    Stress(Box<StressArgs>),
}

#[derive(Args, Debug)]
pub struct CoordinatorArgs {
    /// Listen address
    #[arg(long, env = "CONNBENCH_BIND", default_value = connbench_coordinator::DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// clientStart of the first token
    #[arg(long, env = "CONNBENCH_CLIENT_BASE", default_value_t = 0)]
    pub client_base: u64,

    /// timeStart of the first token, in seconds
    #[arg(long, env = "CONNBENCH_TIME_BASE", default_value_t = 0)]
    pub time_base: u64,

    /// Ramp-delay increment per token, in seconds
    #[arg(long, env = "CONNBENCH_TIME_STEP", default_value_t = connbench_coordinator::DEFAULT_TIME_STEP)]
    pub time_step: u64,
}

/// Stress options; every value overrides the same field of `--config`
#[derive(Args, Debug, Default)]
pub struct StressArgs {
    /// JSON configuration file
    #[arg(short, long, env = "CONNBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker URL (mqtt://host:1883, mqtts://host:8883)
    #[arg(short, long, env = "CONNBENCH_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Start coordinator token URL (http://host:8099/getToken)
    #[arg(short, long, env = "CONNBENCH_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Clients driven by this process
    #[arg(short = 'n', long, env = "CONNBENCH_CLIENTS")]
    pub clients: Option<u64>,

    /// Messages each client publishes
    #[arg(short, long, env = "CONNBENCH_MESSAGES")]
    pub messages: Option<usize>,

    /// Per-operation timeout in milliseconds
    #[arg(long, env = "CONNBENCH_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Pause between publishes in milliseconds
    #[arg(long, env = "CONNBENCH_PAUSE_MS")]
    pub pause_ms: Option<u64>,

    /// Publish QoS (0, 1 or 2)
    #[arg(long, env = "CONNBENCH_PUBLISHER_QOS", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub publisher_qos: Option<u8>,

    /// Echo subscription QoS (0, 1 or 2)
    #[arg(long, env = "CONNBENCH_SUBSCRIBER_QOS", value_parser = clap::value_parser!(u8).range(0..=2))]
    pub subscriber_qos: Option<u8>,

    /// Publish with the retained flag
    #[arg(long, env = "CONNBENCH_RETAINED")]
    pub retained: bool,

    /// Subscribe to each client's own topic and count echoes
    #[arg(long, env = "CONNBENCH_SUBSCRIBE")]
    pub subscribe: bool,

    /// Keep connections open after publishing until a termination signal
    #[arg(long, env = "CONNBENCH_HOLD")]
    pub hold: bool,

    /// Broker username
    #[arg(short, long, env = "CONNBENCH_USERNAME")]
    pub username: Option<String>,

    /// Broker password
    #[arg(short, long, env = "CONNBENCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// CA certificate PEM file
    #[arg(long, env = "CONNBENCH_CA_FILE")]
    pub ca_file: Option<PathBuf>,

    /// Client certificate PEM file
    #[arg(long, env = "CONNBENCH_CERT_FILE")]
    pub cert_file: Option<PathBuf>,

    /// Client private key PEM file
    #[arg(long, env = "CONNBENCH_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Accept any broker certificate
    #[arg(long, env = "CONNBENCH_SKIP_TLS_VERIFY")]
    pub skip_tls_verify: bool,

    /// Payload: literal text, or @path to publish a file's contents
    #[arg(long, env = "CONNBENCH_PAYLOAD")]
    pub payload: Option<String>,

    /// Topic template, {id} is replaced with the client id
    #[arg(long, env = "CONNBENCH_TOPIC")]
    pub topic: Option<String>,

    /// Publisher client-id template
    #[arg(long, env = "CONNBENCH_PUBLISHER_ID")]
    pub publisher_id: Option<String>,

    /// Subscriber client-id template
    #[arg(long, env = "CONNBENCH_SUBSCRIBER_ID")]
    pub subscriber_id: Option<String>,

    /// MQTT keep-alive in seconds
    #[arg(long, env = "CONNBENCH_KEEP_ALIVE_SECS")]
    pub keep_alive_secs: Option<u64>,

    /// Disable automatic reconnects
    #[arg(long, env = "CONNBENCH_NO_RECONNECT")]
    pub no_reconnect: bool,

    /// Delay between worker spawns in microseconds
    #[arg(long, env = "CONNBENCH_SPAWN_INTERVAL_US")]
    pub spawn_interval_us: Option<u64>,

    /// Seconds to keep collecting results after a termination signal
    #[arg(long, env = "CONNBENCH_DRAIN_GRACE_SECS")]
    pub drain_grace_secs: Option<u64>,

    /// Write the aggregate report as JSON
    #[arg(long, env = "CONNBENCH_JSON_OUTPUT")]
    pub json_output: Option<PathBuf>,
}

impl StressArgs {
    /// Merge the configuration file (if any) with the command-line values
    pub fn load_config(&self) -> Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => LoadConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from: {}", path.display()))?,
            None => LoadConfig::default(),
        };

        override_with(&mut config.broker_url, self.broker_url.clone());
        override_with(&mut config.token_url, self.token_url.clone());
        override_with(&mut config.client_count, self.clients);
        override_with(&mut config.messages_per_client, self.messages);
        override_with(&mut config.timeout_ms, self.timeout_ms);
        override_with(&mut config.pause_ms, self.pause_ms);
        override_with(&mut config.publisher_qos, qos(self.publisher_qos)?);
        override_with(&mut config.subscriber_qos, qos(self.subscriber_qos)?);
        override_with(&mut config.topic_template, self.topic.clone());
        override_with(&mut config.publisher_id_template, self.publisher_id.clone());
        override_with(&mut config.subscriber_id_template, self.subscriber_id.clone());
        override_with(&mut config.keep_alive_secs, self.keep_alive_secs);
        override_with(&mut config.spawn_interval_us, self.spawn_interval_us);
        override_with(&mut config.drain_grace_secs, self.drain_grace_secs);

        if self.username.is_some() {
            config.username = self.username.clone();
        }
        if self.password.is_some() {
            config.password = self.password.clone();
        }
        if self.ca_file.is_some() {
            config.ca_file = self.ca_file.clone();
        }
        if self.cert_file.is_some() {
            config.cert_file = self.cert_file.clone();
        }
        if self.key_file.is_some() {
            config.key_file = self.key_file.clone();
        }
        if self.payload.is_some() {
            config.payload = self.payload.clone();
        }

        // Switches only ever turn a behavior on (or reconnects off)
        config.retained |= self.retained;
        config.subscribe |= self.subscribe;
        config.hold_until_drain |= self.hold;
        config.skip_tls_verify |= self.skip_tls_verify;
        if self.no_reconnect {
            config.auto_reconnect = false;
        }

        Ok(config)
    }
}

fn override_with<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn qos(level: Option<u8>) -> Result<Option<QoS>> {
    level
        .map(|level| QoS::try_from(level).map_err(anyhow::Error::msg))
        .transpose()
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Coordinator(args) => run_coordinator(args).await,
            Commands::Stress(args) => run_stress(*args).await,
        }
    }
}

async fn run_coordinator(args: CoordinatorArgs) -> Result<()> {
    let config = CoordinatorConfig {
        bind: args.bind,
        client_base: args.client_base,
        time_base: args.time_base,
        time_step: args.time_step,
    };

    connbench_coordinator::serve(&config, async {
        let signal = wait_for_termination().await;
        tracing::info!(signal, "Received termination signal, stopping coordinator");
    })
    .await
    .context("Start coordinator failed")
}

async fn run_stress(args: StressArgs) -> Result<()> {
    let config = args.load_config()?;
    config.validate().context("Configuration error")?;

    let mut connector = MqttConnector::new();
    if config.uses_tls() {
        if let Some(material) = config.tls_material().context("Configuration error")? {
            connector = connector
                .with_tls(&material)
                .context("Configuration error: TLS material rejected")?;
        }
    }

    let dispatcher = DispatcherBuilder::from_config(&config)
        .context("Configuration error")?
        .connector(Arc::new(connector))
        .build()?;

    report::print_banner(&config);

    let token = TokenClient::new(config.token_url.clone())?
        .fetch()
        .await
        .context("Could not obtain a start token")?;

    let started_at = Utc::now();
    let stats = dispatcher.run_with_signal_handling(token).await?;
    let finished_at = Utc::now();

    report::print_summary(&stats);

    if let Some(path) = &args.json_output {
        let report = RunReport::new(&config, token, started_at, finished_at, stats);
        report::write_json(&report, path)
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
