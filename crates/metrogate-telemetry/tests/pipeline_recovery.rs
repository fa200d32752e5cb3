//! Integration tests for the telemetry pipeline against the mock backend.
//!
//! Time is paused, so backoff and probe intervals elapse instantly while the
//! ordering of events stays deterministic.

use metrogate_telemetry::mock::{MockBackend, MockBackendHandle};
use metrogate_telemetry::{
    AnyBackend, PipelineConfig, TelemetryHandle, TelemetryPipeline, TelemetryPoint,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn point(n: i64) -> TelemetryPoint {
    TelemetryPoint::builder("metro_access")
        .tag("user", "card-42")
        .field("access_id", n)
        .field("access_granted", true)
        .build()
        .unwrap()
}

fn ids(points: &[TelemetryPoint]) -> Vec<i64> {
    points
        .iter()
        .filter_map(|p| p.field("access_id").and_then(|v| v.as_i64()))
        .collect()
}

struct Harness {
    telemetry: TelemetryHandle,
    backend: MockBackendHandle,
    shutdown: watch::Sender<bool>,
    writer: JoinHandle<()>,
}

impl Harness {
    fn start(config: PipelineConfig) -> Self {
        let (backend, backend_handle) = MockBackend::new();
        let pipeline = TelemetryPipeline::new(config);
        let telemetry = pipeline.handle();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let writer = tokio::spawn(pipeline.into_writer(AnyBackend::Mock(backend)).run(shutdown_rx));

        Self {
            telemetry,
            backend: backend_handle,
            shutdown,
            writer,
        }
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.writer.await.unwrap();
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        buffer_capacity: 100,
        batch_size: 10,
        write_timeout: Duration::from_secs(1),
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(2),
        health_interval: Duration::from_secs(5),
        flush_interval: Duration::from_millis(200),
    }
}

#[tokio::test(start_paused = true)]
async fn test_outage_then_ordered_flush() {
    let harness = Harness::start(config());
    harness.backend.set_reachable(false);

    for n in 0..25 {
        harness.telemetry.enqueue(point(n));
    }
    tokio::time::sleep(Duration::from_secs(3)).await;

    let stats = harness.telemetry.stats();
    assert!(!stats.healthy);
    assert_eq!(stats.buffered, 25);
    assert_eq!(stats.written, 0);
    assert!(stats.failed_writes >= 1);
    assert!(harness.backend.written().is_empty());

    harness.backend.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let stats = harness.telemetry.stats();
    assert!(stats.healthy);
    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.written, 25);
    assert_eq!(ids(&harness.backend.written()), (0..25).collect::<Vec<_>>());

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_outage_overflow_keeps_newest() {
    let harness = Harness::start(PipelineConfig {
        buffer_capacity: 20,
        ..config()
    });
    harness.backend.set_reachable(false);

    let mut last_dropped = 0;
    for n in 0..50 {
        harness.telemetry.enqueue(point(n));
        let stats = harness.telemetry.stats();
        assert!(stats.buffered <= 20);
        assert!(stats.dropped >= last_dropped);
        last_dropped = stats.dropped;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(harness.telemetry.stats().dropped, 30);

    harness.backend.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(ids(&harness.backend.written()), (30..50).collect::<Vec<_>>());
    assert_eq!(harness.telemetry.stats().dropped, 30);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_backend_times_out_and_retries() {
    let harness = Harness::start(config());
    harness.backend.set_latency(Duration::from_secs(10));

    for n in 0..10 {
        harness.telemetry.enqueue(point(n));
    }
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let stats = harness.telemetry.stats();
    assert!(!stats.healthy);
    assert_eq!(stats.buffered, 10);
    assert!(stats.failed_writes >= 1);

    harness.backend.set_latency(Duration::ZERO);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(ids(&harness.backend.written()), (0..10).collect::<Vec<_>>());

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_never_waits_on_backend() {
    let harness = Harness::start(config());
    harness.backend.set_latency(Duration::from_secs(60));

    let started = tokio::time::Instant::now();
    for n in 0..1_000 {
        harness.telemetry.enqueue(point(n));
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(harness.telemetry.stats().buffered, 100);

    harness.stop().await;
}
