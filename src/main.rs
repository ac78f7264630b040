//! connbench - distributed connection and throughput load harness for MQTT brokers

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

const VERBOSE_FILTER: &str =
    "info,connbench=debug,connbench_core=debug,connbench_transport=debug,connbench_coordinator=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --verbose
    let default_filter = if cli.verbose { VERBOSE_FILTER } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    cli.run().await
}
