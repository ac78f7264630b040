//! Tests for the Dispatcher module

use super::aggregator::{AggregatedStats, ResultAggregator};
use super::builder::DispatcherBuilder;
use crate::config::{ConfigError, LoadConfig};
use crate::counters::RunCounters;
use crate::error::BenchError;
use crate::mock::MockConnector;
use crate::token::StartToken;
use crate::worker::{WorkerConfig, WorkerResult, WorkerStats};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

// ============================================================================
// Helpers
// ============================================================================

fn fast_worker_config(messages: usize) -> WorkerConfig {
    WorkerConfig {
        messages,
        timeout: Duration::from_millis(500),
        pause: Duration::ZERO,
        disconnect_grace: Duration::from_millis(10),
        ..WorkerConfig::default()
    }
}

fn dispatcher_builder(clients: u64, config: WorkerConfig, connector: Arc<MockConnector>) -> DispatcherBuilder {
    DispatcherBuilder::new()
        .client_count(clients)
        .worker_config(config)
        .connector(connector)
        .counters(Arc::new(RunCounters::new(0)))
        .spawn_interval(Duration::ZERO)
}

fn completed(worker_id: u64, published: usize, publish_time: Duration) -> WorkerResult {
    let mut stats = WorkerStats::new();
    let start = Instant::now();
    stats.started_at = Some(start);
    stats.ended_at = Some(start + publish_time);
    for id in 0..published as u64 {
        stats.record_published(id);
    }
    WorkerResult::completed(worker_id, &stats, publish_time, false)
}

// ============================================================================
// Aggregator Tests
// ============================================================================

#[test]
fn test_aggregate_empty() {
    let aggregator = ResultAggregator::new(0, Arc::new(RunCounters::default()));
    let stats = aggregator.finish();
    assert_eq!(stats.reported_workers, 0);
    assert_eq!(stats.throughput, 0.0);
    assert!(aggregator.is_complete());
}

#[test]
fn test_aggregate_mixed_results() {
    let mut aggregator = ResultAggregator::new(4, Arc::new(RunCounters::default()));
    aggregator.start();

    assert!(aggregator.record(completed(0, 10, Duration::from_secs(1))));
    assert!(aggregator.record(completed(1, 5, Duration::from_secs(1))));
    assert!(aggregator.record(WorkerResult::connect_failed(2, "refused")));
    assert!(aggregator.record(WorkerResult::connect_failed(3, "refused")));
    assert!(aggregator.is_complete());

    let stats = aggregator.finish();
    assert_eq!(stats.expected_workers, 4);
    assert_eq!(stats.reported_workers, 4);
    assert_eq!(stats.completed_workers, 2);
    assert_eq!(stats.connect_failures, 2);
    assert_eq!(stats.messages_published, 15);
    assert_eq!(stats.connect_errors.get("refused"), Some(&2));
    assert!((stats.connect_success_rate() - 0.5).abs() < 1e-9);
    assert!((stats.publish_rate.max - 10.0).abs() < 1e-6);
    assert!((stats.publish_rate.min - 5.0).abs() < 1e-6);
}

#[test]
fn test_aggregate_ignores_duplicates() {
    let mut aggregator = ResultAggregator::new(2, Arc::new(RunCounters::default()));
    assert!(aggregator.record(completed(7, 3, Duration::from_millis(10))));
    assert!(!aggregator.record(completed(7, 3, Duration::from_millis(10))));
    assert!(!aggregator.is_complete());

    let stats = aggregator.finish();
    assert_eq!(stats.reported_workers, 1);
    assert_eq!(stats.messages_published, 3);
}

#[test]
fn test_aggregate_includes_live_counters() {
    let counters = Arc::new(RunCounters::new(100));
    counters.next_message_id();
    counters.next_message_id();
    counters.record_published();

    let aggregator = ResultAggregator::new(1, Arc::clone(&counters));
    let stats = aggregator.finish();
    assert_eq!(stats.live_published, 1);
    assert_eq!(stats.messages_attempted, 2);
    assert_eq!(stats.unreported_workers(), 1);
}

#[test]
fn test_aggregated_stats_rates() {
    let stats = AggregatedStats {
        messages_published: 90,
        publish_failures: 10,
        ..AggregatedStats::default()
    };
    assert!((stats.publish_success_rate() - 0.9).abs() < 1e-9);
    assert_eq!(AggregatedStats::default().publish_success_rate(), 0.0);
}

#[test]
fn test_aggregated_stats_serialize() {
    let stats = AggregatedStats {
        expected_workers: 3,
        interrupted: true,
        ..AggregatedStats::default()
    };
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["expected_workers"], 3);
    assert_eq!(json["interrupted"], true);
    assert!(json["publish_time_ms"]["p99"].is_number());
}

// ============================================================================
// Builder Tests
// ============================================================================

#[test]
fn test_builder_missing_connector() {
    let result = DispatcherBuilder::new()
        .client_count(1)
        .worker_config(WorkerConfig::default())
        .build();
    assert!(matches!(result, Err(BenchError::MissingConfig("connector"))));
}

#[test]
fn test_builder_missing_worker_config() {
    let result = DispatcherBuilder::new()
        .client_count(1)
        .connector(Arc::new(MockConnector::new()))
        .build();
    assert!(matches!(result, Err(BenchError::MissingConfig("worker_config"))));
}

#[test]
fn test_builder_zero_clients() {
    let result = DispatcherBuilder::new()
        .worker_config(WorkerConfig::default())
        .connector(Arc::new(MockConnector::new()))
        .build();
    assert!(matches!(
        result,
        Err(BenchError::Config(ConfigError::ZeroClientCount))
    ));
}

#[test]
fn test_builder_from_load_config() {
    let config = LoadConfig {
        broker_url: "mqtt://localhost:1883".into(),
        token_url: "http://localhost:8099/getToken".into(),
        client_count: 25,
        ..LoadConfig::default()
    };
    let dispatcher = DispatcherBuilder::from_config(&config)
        .unwrap()
        .connector(Arc::new(MockConnector::new()))
        .build()
        .unwrap();

    assert_eq!(dispatcher.client_count(), 25);
    let assignment = dispatcher.assignment(StartToken::new(2, 20)).unwrap();
    assert_eq!(assignment.ids, 50..75);
}

// ============================================================================
// Dispatcher Tests
// ============================================================================

#[tokio::test]
async fn test_all_workers_complete() {
    let connector = Arc::new(MockConnector::new());
    let dispatcher = dispatcher_builder(50, fast_worker_config(10), connector.clone())
        .build()
        .unwrap();

    let stats = dispatcher.run(StartToken::new(0, 0)).await.unwrap();

    assert_eq!(stats.reported_workers, 50);
    assert_eq!(stats.completed_workers, 50);
    assert_eq!(stats.connect_failures, 0);
    assert_eq!(stats.messages_published, 500);
    assert_eq!(stats.live_published, 500);
    assert!(!stats.interrupted);
    assert_eq!(connector.broker.connects.load(Ordering::SeqCst), 50);
    assert_eq!(connector.broker.live_sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_workers_use_assigned_range() {
    let connector = Arc::new(MockConnector::new());
    let dispatcher = dispatcher_builder(5, fast_worker_config(1), connector.clone())
        .build()
        .unwrap();

    dispatcher.run(StartToken::new(2, 0)).await.unwrap();

    let mut ids = connector.broker.client_ids();
    ids.sort();
    let expected: Vec<String> = (10..15).map(|id| format!("connbench-{id}-pub")).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_connect_failures_are_reported_per_worker() {
    let connector = Arc::new(MockConnector::failing());
    let dispatcher = dispatcher_builder(8, fast_worker_config(10), connector.clone())
        .build()
        .unwrap();

    let stats = dispatcher.run(StartToken::new(0, 0)).await.unwrap();

    assert_eq!(stats.reported_workers, 8);
    assert_eq!(stats.connect_failures, 8);
    assert_eq!(stats.completed_workers, 0);
    assert_eq!(stats.messages_published, 0);
    assert_eq!(connector.broker.publishes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_range_overflow_is_config_error() {
    let dispatcher = dispatcher_builder(4, fast_worker_config(1), Arc::new(MockConnector::new()))
        .build()
        .unwrap();

    let result = dispatcher.run(StartToken::new(u64::MAX / 2, 0)).await;
    assert!(matches!(
        result,
        Err(BenchError::Config(ConfigError::RangeOverflow { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_ramp_delay_is_honoured() {
    let connector = Arc::new(MockConnector::new());
    let dispatcher = dispatcher_builder(3, fast_worker_config(2), connector)
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    let stats = dispatcher.run(StartToken::new(0, 30)).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(stats.completed_workers, 3);
}

#[tokio::test]
async fn test_shutdown_during_ramp_delay_spawns_nothing() {
    let connector = Arc::new(MockConnector::new());
    let dispatcher = dispatcher_builder(10, fast_worker_config(1), connector.clone())
        .build()
        .unwrap();

    let stats = tokio::time::timeout(
        Duration::from_secs(2),
        dispatcher.run_until(StartToken::new(0, 3600), async {}),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(stats.interrupted);
    assert_eq!(stats.reported_workers, 0);
    assert_eq!(connector.broker.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_drains_holding_workers() {
    let connector = Arc::new(MockConnector::new());
    let config = WorkerConfig {
        hold_until_drain: true,
        ..fast_worker_config(1)
    };
    let dispatcher = dispatcher_builder(10, config, connector.clone())
        .drain_grace(Duration::from_secs(5))
        .build()
        .unwrap();

    let (trigger, signal) = oneshot::channel::<()>();
    let probe = dispatcher.counters();
    tokio::spawn(async move {
        // Wait until every worker has published and is holding its connection
        while probe.published() < 10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = trigger.send(());
    });

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.run_until(StartToken::new(0, 0), async {
            let _ = signal.await;
        }),
    )
    .await
    .expect("dispatcher deadlocked during drain")
    .unwrap();

    assert!(stats.interrupted);
    assert_eq!(stats.reported_workers, 10);
    assert_eq!(stats.completed_workers, 10);
    assert_eq!(stats.drained_workers, 10);
    assert_eq!(stats.messages_published, 10);
    assert_eq!(connector.broker.live_sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_returns_after_grace_with_stuck_workers() {
    // Connects hang longer than the grace period
    let connector = Arc::new(MockConnector::new().with_connect_delay(Duration::from_secs(2)));
    let config = WorkerConfig {
        timeout: Duration::from_secs(10),
        ..fast_worker_config(1)
    };
    let dispatcher = dispatcher_builder(10, config, connector)
        .drain_grace(Duration::from_millis(100))
        .build()
        .unwrap();

    let started = Instant::now();
    let stats = dispatcher
        .run_until(StartToken::new(0, 0), tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(2));
    assert!(stats.interrupted);
    assert_eq!(stats.reported_workers, 0);
    assert_eq!(stats.unreported_workers(), 10);
}

#[tokio::test]
async fn test_subscribe_run_counts_received() {
    let connector = Arc::new(MockConnector::new());
    let config = WorkerConfig {
        subscribe: true,
        ..fast_worker_config(4)
    };
    let dispatcher = dispatcher_builder(6, config, connector).build().unwrap();

    let stats = dispatcher.run(StartToken::new(1, 0)).await.unwrap();

    assert_eq!(stats.messages_published, 24);
    assert_eq!(stats.messages_received, 24);
}
