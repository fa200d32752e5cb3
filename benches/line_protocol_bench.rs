//! Performance benchmarks for telemetry encoding and enqueue.
//!
//! The sensor loop and the gate enqueue points on their hot path, so both
//! building a point and pushing it into the pipeline must stay cheap.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench line_protocol_bench
//! ```

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use metrogate_core::{AccessOutcome, DenyReason, DoorState};
use metrogate_telemetry::measurements::{self, AccessPoint, DoorStatus};
use metrogate_telemetry::{PipelineConfig, TelemetryPipeline, TelemetryPoint};
use std::hint::black_box;

fn access_point() -> TelemetryPoint {
    measurements::access(&AccessPoint {
        door: "canceladora_1",
        user: "Juan Perez",
        access_id: 42,
        outcome: AccessOutcome::Denied,
        reason: Some(DenyReason::Cooldown),
        at: Utc::now(),
    })
}

/// Benchmark building the two hot-path measurements.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.throughput(Throughput::Elements(1));

    group.bench_function("access_point", |b| {
        b.iter(|| black_box(access_point()));
    });

    group.bench_function("door_status_point", |b| {
        b.iter(|| {
            black_box(measurements::door_status(
                &DoorStatus {
                    state: DoorState::Crossing,
                    detecting_crossing: true,
                    crossing_stalled: false,
                    laser_a_active: true,
                    laser_b_active: true,
                },
                Utc::now(),
            ))
        });
    });

    group.finish();
}

/// Benchmark line-protocol encoding of single points and batches.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let point = access_point();

    for size in [1usize, 100, 500] {
        let batch = vec![point.clone(); size];
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| {
                let body = batch
                    .iter()
                    .map(TelemetryPoint::to_line_protocol)
                    .collect::<Vec<_>>()
                    .join("\n");
                black_box(body);
            });
        });
    }

    group.finish();
}

/// Benchmark enqueue into a full buffer (the drop-oldest path).
fn bench_enqueue_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");
    group.throughput(Throughput::Elements(1));

    let pipeline = TelemetryPipeline::new(PipelineConfig {
        buffer_capacity: 1_000,
        ..PipelineConfig::default()
    });
    let handle = pipeline.handle();
    let point = access_point();
    for _ in 0..1_000 {
        handle.enqueue(point.clone());
    }

    group.bench_function("enqueue_full_buffer", |b| {
        b.iter(|| handle.enqueue(black_box(point.clone())));
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_encode, bench_enqueue_full);
criterion_main!(benches);
