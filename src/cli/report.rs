//! Run summary output

use std::fs::File;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use connbench_core::{AggregatedStats, LatencyPercentiles, LoadConfig, StartToken};
use serde::Serialize;

/// Aggregate report written with `--json-output`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub token: StartToken,
    pub first_client_id: u64,
    pub config: LoadConfig,
    pub stats: AggregatedStats,
    pub connect_success_rate_percent: f64,
    pub publish_success_rate_percent: f64,
}

impl RunReport {
    pub fn new(
        config: &LoadConfig,
        token: StartToken,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        stats: AggregatedStats,
    ) -> Self {
        Self {
            started_at,
            finished_at,
            token,
            first_client_id: token.client_start.saturating_mul(config.client_count),
            config: config.clone(),
            connect_success_rate_percent: stats.connect_success_rate() * 100.0,
            publish_success_rate_percent: stats.publish_success_rate() * 100.0,
            stats,
        }
    }
}

pub fn write_json(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

pub fn print_banner(config: &LoadConfig) {
    println!("\n{}", "=".repeat(70));
    println!("   connbench - MQTT Broker Load Harness");
    println!("{}", "=".repeat(70));
    println!();
    println!("Configuration:");
    println!("  Broker:       {}", config.broker_url);
    println!("  Token URL:    {}", config.token_url);
    println!("  Clients:      {}", config.client_count);
    println!("  Messages:     {}", config.messages_per_client);
    println!("  Pause:        {} ms", config.pause_ms);
    println!(
        "  QoS:          pub {} / sub {}",
        config.publisher_qos.level(),
        config.subscriber_qos.level()
    );
    println!(
        "  Subscribe:    {}",
        if config.subscribe { "enabled" } else { "disabled" }
    );
    println!(
        "  Hold:         {}",
        if config.hold_until_drain {
            "until signal"
        } else {
            "disabled"
        }
    );
    println!("{}", "=".repeat(70));
    println!();
}

pub fn print_summary(stats: &AggregatedStats) {
    println!("\n{}", "=".repeat(70));
    println!(
        "   Results{}",
        if stats.interrupted {
            " (interrupted)"
        } else {
            ""
        }
    );
    println!("{}", "=".repeat(70));
    println!();
    println!("Workers:");
    println!("  Expected:          {}", stats.expected_workers);
    println!("  Reported:          {}", stats.reported_workers);
    println!(
        "  Completed:         {} ({:.2}%)",
        stats.completed_workers,
        stats.connect_success_rate() * 100.0
    );
    println!("  Connect failures:  {}", stats.connect_failures);
    println!("  Drained early:     {}", stats.drained_workers);
    if stats.unreported_workers() > 0 {
        println!("  Unreported:        {}", stats.unreported_workers());
    }
    println!();
    println!("Messages:");
    println!(
        "  Published:         {} ({:.2}% of attempts)",
        stats.messages_published,
        stats.publish_success_rate() * 100.0
    );
    println!("  Publish failures:  {}", stats.publish_failures);
    println!("  Received:          {}", stats.messages_received);
    println!("  Connection losses: {}", stats.connection_losses);
    println!();
    println!("Throughput:");
    println!("  Wall clock:        {:.2} s", stats.wall_clock_secs);
    println!("  Aggregate:         {:.2} msg/s", stats.throughput);
    println!(
        "  Per worker:        min {:.2} / mean {:.2} / max {:.2} msg/s",
        stats.publish_rate.min, stats.publish_rate.mean, stats.publish_rate.max
    );
    println!();
    print_percentiles("Publish time (ms):", &stats.publish_time_ms);
    if stats.messages_received > 0 {
        print_percentiles("Receive time (ms):", &stats.receive_time_ms);
    }

    if !stats.connect_errors.is_empty() {
        println!("Connect errors:");
        for (error, count) in &stats.connect_errors {
            println!("  {count:>6} x {error}");
        }
        println!();
    }
    println!("{}", "=".repeat(70));
}

fn print_percentiles(title: &str, p: &LatencyPercentiles) {
    println!("{title}");
    println!(
        "  Min: {:.2}  Mean: {:.2}  Max: {:.2}  StdDev: {:.2}",
        p.min, p.mean, p.max, p.stddev
    );
    println!(
        "  P50: {:.2}  P90: {:.2}  P95: {:.2}  P99: {:.2}",
        p.p50, p.p90, p.p95, p.p99
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_layout() {
        let config = LoadConfig {
            client_count: 10,
            password: Some("secret".into()),
            ..Default::default()
        };
        let stats = AggregatedStats {
            expected_workers: 10,
            reported_workers: 10,
            completed_workers: 10,
            messages_published: 90,
            publish_failures: 10,
            ..Default::default()
        };
        let now = Utc::now();
        let report = RunReport::new(&config, StartToken::new(3, 30), now, now, stats);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&report, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["first_client_id"], 30);
        assert_eq!(json["token"]["clientStart"], 3);
        assert_eq!(json["stats"]["messages_published"], 90);
        assert_eq!(json["publish_success_rate_percent"], 90.0);
        assert!(json["config"].get("password").is_none());
    }
}
