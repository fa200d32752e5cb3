//! Bounded, non-blocking telemetry pipeline.
//!
//! Producers (the sensor loop, the gate, the status reporter) call
//! [`TelemetryHandle::enqueue`], which only takes a short mutex and never
//! waits on I/O. A single [`TelemetryWriter`] task drains the buffer in
//! batches and talks to the backend.
//!
//! ```text
//! ┌──────────┐ enqueue  ┌────────────────┐  batch   ┌──────────┐
//! │ Gate     │─────────►│                │─────────►│          │
//! ├──────────┤          │ VecDeque       │          │ Backend  │
//! │ Sensor   │─────────►│ (drop oldest)  │◄─────────│          │
//! ├──────────┤          │                │ requeue  └──────────┘
//! │ Status   │─────────►│                │ on failure
//! └──────────┘          └────────────────┘
//! ```
//!
//! # Failure Handling
//!
//! - Overflow drops the oldest point and bumps a monotonic counter.
//! - A failed or timed-out batch goes back to the front of the buffer, so
//!   points are flushed in enqueue order once the backend recovers.
//! - A batch rejected with a 4xx status (other than 429) is discarded.
//! - While the backend is unhealthy the writer probes it with exponential
//!   backoff and does not attempt writes.
//!
//! # Examples
//!
//! ```no_run
//! use metrogate_telemetry::mock::MockBackend;
//! use metrogate_telemetry::pipeline::{PipelineConfig, TelemetryPipeline};
//! use metrogate_telemetry::{AnyBackend, TelemetryPoint};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (backend, _backend_handle) = MockBackend::new();
//!     let pipeline = TelemetryPipeline::new(PipelineConfig::default());
//!     let telemetry = pipeline.handle();
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let writer = tokio::spawn(pipeline.into_writer(AnyBackend::Mock(backend)).run(shutdown_rx));
//!
//!     telemetry.enqueue(
//!         TelemetryPoint::builder("metro_access")
//!             .field("access_granted", true)
//!             .build()
//!             .unwrap(),
//!     );
//!
//!     let _ = shutdown_tx.send(true);
//!     let _ = writer.await;
//! }
//! ```

use metrogate_core::constants::{DEFAULT_TELEMETRY_BATCH, DEFAULT_TELEMETRY_BUFFER};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::backend::{AnyBackend, TimeSeriesBackend};
use crate::error::{TelemetryError, TelemetryWriteError};
use crate::point::TelemetryPoint;

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Points held while the backend is slow or down.
    pub buffer_capacity: usize,
    /// Points per backend write.
    pub batch_size: usize,
    /// Hard limit on one write or probe.
    pub write_timeout: Duration,
    /// First retry delay after a failure.
    pub initial_backoff: Duration,
    /// Retry delay ceiling.
    pub max_backoff: Duration,
    /// Period of the health probe while healthy.
    pub health_interval: Duration,
    /// Partial batches are flushed at least this often.
    pub flush_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_TELEMETRY_BUFFER,
            batch_size: DEFAULT_TELEMETRY_BATCH,
            write_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    /// Check the configuration for values the writer cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::Config` for a zero capacity, zero batch
    /// size, zero timeout or a backoff ceiling below the initial backoff.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.buffer_capacity == 0 {
            return Err(TelemetryError::Config("buffer_capacity must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TelemetryError::Config("batch_size must be at least 1".to_string()));
        }
        if self.write_timeout.is_zero() {
            return Err(TelemetryError::Config("write_timeout must be positive".to_string()));
        }
        if self.initial_backoff.is_zero() || self.max_backoff < self.initial_backoff {
            return Err(TelemetryError::Config(
                "backoff must satisfy 0 < initial_backoff <= max_backoff".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time pipeline statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub buffered: usize,
    pub capacity: usize,
    /// Points evicted by overflow. Never decreases.
    pub dropped: u64,
    /// Points discarded because the backend rejected their batch.
    pub rejected: u64,
    pub written: u64,
    pub failed_writes: u64,
    pub healthy: bool,
}

#[derive(Debug)]
struct Shared {
    buffer: Mutex<VecDeque<TelemetryPoint>>,
    capacity: usize,
    batch_size: usize,
    notify: Notify,
    dropped: AtomicU64,
    rejected: AtomicU64,
    written: AtomicU64,
    failed_writes: AtomicU64,
    healthy: AtomicBool,
}

impl Shared {
    fn push(&self, point: TelemetryPoint) {
        let len = {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                buffer.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(point);
            buffer.len()
        };

        if len >= self.batch_size {
            self.notify.notify_one();
        }
    }

    fn take_batch(&self) -> Vec<TelemetryPoint> {
        let mut buffer = self.buffer.lock();
        let count = buffer.len().min(self.batch_size);
        buffer.drain(..count).collect()
    }

    /// Put a failed batch back at the front, evicting the oldest points if
    /// producers filled the buffer in the meantime.
    fn requeue(&self, batch: Vec<TelemetryPoint>) {
        let mut buffer = self.buffer.lock();
        for point in batch.into_iter().rev() {
            buffer.push_front(point);
        }

        let excess = buffer.len().saturating_sub(self.capacity);
        if excess > 0 {
            buffer.drain(..excess);
            self.dropped.fetch_add(excess as u64, Ordering::Relaxed);
        }
    }

    fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

/// Owner of a pipeline before its writer is started.
#[derive(Debug)]
pub struct TelemetryPipeline {
    shared: Arc<Shared>,
    config: PipelineConfig,
}

impl TelemetryPipeline {
    /// Create an empty pipeline. A zero capacity or batch size is raised to 1.
    pub fn new(config: PipelineConfig) -> Self {
        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_capacity.clamp(1, 1024))),
            capacity: config.buffer_capacity.max(1),
            batch_size: config.batch_size.max(1),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            written: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        });

        Self { shared, config }
    }

    /// Producer handle. Cheap to clone.
    pub fn handle(&self) -> TelemetryHandle {
        TelemetryHandle {
            shared: self.shared.clone(),
        }
    }

    /// Turn the pipeline into its writer task.
    pub fn into_writer<B: TimeSeriesBackend>(self, backend: B) -> TelemetryWriter<B> {
        let backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        TelemetryWriter {
            shared: self.shared,
            backend,
            config: self.config,
            backoff,
        }
    }
}

/// Producer side of the pipeline.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    shared: Arc<Shared>,
}

impl TelemetryHandle {
    /// Buffer a point for the writer. Never blocks on I/O.
    pub fn enqueue(&self, point: TelemetryPoint) {
        trace!(measurement = point.measurement(), "Telemetry point enqueued");
        self.shared.push(point);
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            buffered: self.shared.buffer.lock().len(),
            capacity: self.shared.capacity,
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
            written: self.shared.written.load(Ordering::Relaxed),
            failed_writes: self.shared.failed_writes.load(Ordering::Relaxed),
            healthy: self.is_healthy(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire)
    }

    /// Copy of the buffered points, oldest first.
    pub fn buffered(&self) -> Vec<TelemetryPoint> {
        self.shared.buffer.lock().iter().cloned().collect()
    }
}

/// Exponential backoff between `initial` and `max`.
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Writer task draining the buffer into a backend.
#[derive(Debug)]
pub struct TelemetryWriter<B = AnyBackend> {
    shared: Arc<Shared>,
    backend: B,
    config: PipelineConfig,
    backoff: Backoff,
}

impl<B: TimeSeriesBackend> TelemetryWriter<B> {
    /// Run until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// On shutdown a final flush is attempted if the backend is healthy;
    /// whatever cannot be written stays counted in the buffered statistic.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            capacity = self.shared.capacity,
            batch_size = self.shared.batch_size,
            "Telemetry writer started"
        );

        let mut flush_tick = interval(self.config.flush_interval);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut probe_tick = interval(self.config.health_interval);
        probe_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first probe
        // happens one interval after start.
        probe_tick.reset();

        loop {
            if *shutdown.borrow() {
                break;
            }

            if !self.is_healthy() {
                let delay = self.backoff.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Backend unhealthy, waiting before probe");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }

                if self.probe().await {
                    self.flush(true).await;
                }
                continue;
            }

            tokio::select! {
                _ = self.shared.notify.notified() => {
                    self.flush(false).await;
                }
                _ = flush_tick.tick() => {
                    self.flush(true).await;
                }
                _ = probe_tick.tick() => {
                    self.probe().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.is_healthy() && !self.shared.is_empty() {
            debug!("Final telemetry flush before shutdown");
            self.flush(true).await;
        }

        let stats = TelemetryHandle {
            shared: self.shared.clone(),
        }
        .stats();
        info!(
            written = stats.written,
            buffered = stats.buffered,
            dropped = stats.dropped,
            "Telemetry writer stopped"
        );
    }

    fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire)
    }

    fn set_healthy(&mut self, healthy: bool) {
        let was = self.shared.healthy.swap(healthy, Ordering::AcqRel);
        if was == healthy {
            return;
        }
        if healthy {
            self.backoff.reset();
            info!("Telemetry backend recovered");
        } else {
            warn!("Telemetry backend unhealthy, buffering points");
        }
    }

    /// Probe the backend and update the health flag.
    async fn probe(&mut self) -> bool {
        let result = match tokio::time::timeout(self.config.write_timeout, self.backend.ping()).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryWriteError::Timeout {
                duration_ms: self.config.write_timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(()) => {
                self.set_healthy(true);
                true
            }
            Err(e) => {
                debug!(error = %e, "Telemetry health probe failed");
                self.set_healthy(false);
                false
            }
        }
    }

    /// Write batches until the buffer is empty (`force`) or holds less than
    /// a full batch, or until the backend fails.
    async fn flush(&mut self, force: bool) {
        loop {
            if !force && self.shared.buffer.lock().len() < self.shared.batch_size {
                return;
            }

            let batch = self.shared.take_batch();
            if batch.is_empty() {
                return;
            }

            if let Err(e) = self.write_batch(&batch).await {
                if e.is_retryable() {
                    self.shared.failed_writes.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, points = batch.len(), "Telemetry write failed, batch requeued");
                    self.shared.requeue(batch);
                    self.set_healthy(false);
                    return;
                }

                self.shared
                    .rejected
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                warn!(error = %e, points = batch.len(), "Telemetry batch rejected, discarding");
                continue;
            }

            self.shared
                .written
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            debug!(points = batch.len(), "Telemetry batch written");
        }
    }

    async fn write_batch(&self, batch: &[TelemetryPoint]) -> Result<(), TelemetryWriteError> {
        match tokio::time::timeout(self.config.write_timeout, self.backend.write(batch)).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryWriteError::Timeout {
                duration_ms: self.config.write_timeout.as_millis() as u64,
            }),
        }
    }
}
