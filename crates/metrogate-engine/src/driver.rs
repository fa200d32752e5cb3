//! Background tasks driving the engine.
//!
//! ```text
//! ┌─────────────┐  levels   ┌──────────────┐  commands  ┌──────────┐
//! │ Beam sensor │──────────►│  SensorLoop  │───────────►│ Actuator │
//! └─────────────┘           │  (10ms tick) │◄───────────│          │
//!                           └──────┬───────┘ confirms   └──────────┘
//!                                  │
//!                                  ▼
//!                           ┌──────────────┐  points   ┌───────────────────┐
//!                           │ AccessEngine │──────────►│ TelemetryPipeline │
//!                           └──────▲───────┘           └───────────────────┘
//!                                  │
//!                           ┌──────┴───────┐
//!                           │StatusReporter│
//!                           └──────────────┘
//! ```
//!
//! Each loop owns its devices and holds only an `Arc<AccessEngine>`. All
//! loops stop when the shared `watch` channel turns `true`; [`EngineRuntime`]
//! owns that channel and the task set.

use chrono::Local;
use metrogate_core::HardwareFaultKind;
use metrogate_core::constants::{
    DEFAULT_MAX_SENSOR_FAILURES, DEFAULT_SENSOR_TICK_MS, DEFAULT_SESSION_SWEEP_MS,
    DEFAULT_STATUS_INTERVAL_MS,
};
use metrogate_hardware::{AnyBeamSensor, AnyDoorActuator, BeamSampler, BeamSensor, DoorActuator};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::engine::{AccessEngine, monotonic_now};
use crate::error::Result;

/// Sensor loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Beam polling period.
    pub tick: Duration,
    /// Session expiry and day rollover period.
    pub sweep_interval: Duration,
    /// Consecutive failed sensor reads before the door faults.
    pub max_sensor_failures: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(DEFAULT_SENSOR_TICK_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SESSION_SWEEP_MS),
            max_sensor_failures: DEFAULT_MAX_SENSOR_FAILURES,
        }
    }
}

/// Fixed-tick loop feeding beam edges and actuator confirmations into the
/// engine and draining its door commands.
#[derive(Debug)]
pub struct SensorLoop {
    engine: Arc<AccessEngine>,
    sensor: AnyBeamSensor,
    actuator: AnyDoorActuator,
    sampler: BeamSampler,
    config: LoopConfig,
    sensor_failures: u32,
}

impl SensorLoop {
    pub fn new(
        engine: Arc<AccessEngine>,
        sensor: AnyBeamSensor,
        actuator: AnyDoorActuator,
        config: LoopConfig,
    ) -> Self {
        let sampler = BeamSampler::with_levels(engine.levels());
        Self {
            engine,
            sensor,
            actuator,
            sampler,
            config,
            sensor_failures: 0,
        }
    }

    /// Run until `shutdown` turns `true`.
    ///
    /// # Errors
    ///
    /// Device errors never end the loop; they fault the door instead. The
    /// `Result` is for the task set.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if let Ok(info) = self.sensor.get_info().await {
            info!(sensor = %info.name, model = %info.model, "Beam sensor attached");
        }
        if let Ok(info) = self.actuator.get_info().await {
            info!(actuator = %info.name, model = %info.model, "Door actuator attached");
        }

        let mut tick = interval(self.config.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(tick_ms = self.config.tick.as_millis() as u64, "Sensor loop started");

        loop {
            tokio::select! {
                _ = tick.tick() => self.step(monotonic_now()).await,
                _ = sweep.tick() => self.engine.sweep(monotonic_now(), Local::now().date_naive()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Sensor loop stopped");
        Ok(())
    }

    /// One tick: read, detect, apply timers, drive the actuator.
    async fn step(&mut self, now: Instant) {
        self.read_sensors(now).await;
        self.engine.tick(now);
        self.drive_actuator(now).await;
    }

    async fn read_sensors(&mut self, now: Instant) {
        match self.sensor.read_levels().await {
            Ok(levels) => {
                if self.sensor_failures > 0 {
                    info!(failures = self.sensor_failures, "Beam sensor recovered");
                }
                self.sensor_failures = 0;
                for sample in self.sampler.update(levels, now) {
                    debug!(sensor = %sample.sensor, occluded = sample.occluded, "Beam edge");
                    self.engine.observe(sample);
                }
            }
            Err(error) => {
                self.sensor_failures = self.sensor_failures.saturating_add(1);
                warn!(%error, failures = self.sensor_failures, "Beam sensor read failed");
                if self.sensor_failures == self.config.max_sensor_failures.max(1) {
                    self.engine.fault(HardwareFaultKind::SensorDropout, now);
                }
            }
        }
    }

    async fn drive_actuator(&mut self, now: Instant) {
        while let Some(command) = self.engine.take_command() {
            debug!(%command, "Sending door command");
            if let Err(error) = self.actuator.command(command).await {
                error!(%error, %command, "Door actuator refused command");
                self.engine.fault(HardwareFaultKind::ActuatorFailure, now);
                return;
            }
        }

        match self.actuator.poll_confirmation().await {
            Ok(Some(command)) => {
                if let Err(error) = self.engine.confirm(command, now) {
                    debug!(%error, %command, "Confirmation rejected");
                }
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "Actuator confirmation poll failed"),
        }
    }
}

/// Enqueues a `metro_system_status` point every `interval`.
#[derive(Debug)]
pub struct StatusReporter {
    engine: Arc<AccessEngine>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(engine: Arc<AccessEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub fn with_default_interval(engine: Arc<AccessEngine>) -> Self {
        Self::new(engine, Duration::from_millis(DEFAULT_STATUS_INTERVAL_MS))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_degraded = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = self.engine.report_status();
                    if status.degraded != was_degraded {
                        if status.degraded {
                            warn!("System degraded");
                        } else {
                            info!("System no longer degraded");
                        }
                        was_degraded = status.degraded;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Status reporter stopped");
        Ok(())
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Success,
    Error,
    /// Aborted after the grace period.
    Cancelled,
    Panic,
}

/// Counts of task endings after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub panicked: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.panicked == 0
    }
}

/// Owner of the engine's background tasks and their shutdown signal.
#[derive(Debug)]
pub struct EngineRuntime {
    tasks: JoinSet<Result<()>>,
    shutdown: watch::Sender<bool>,
}

impl EngineRuntime {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: JoinSet::new(),
            shutdown,
        }
    }

    /// Receiver to hand to a task.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal shutdown, wait up to `grace` for the tasks, then abort the rest.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        // No receivers left is fine: every task already ended.
        let _ = self.shutdown.send(true);

        let mut report = ShutdownReport::default();
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(result)) => Self::record(&mut report, result),
                Ok(None) => break,
                Err(_) => {
                    warn!(remaining = self.tasks.len(), "Shutdown grace period expired, aborting tasks");
                    self.tasks.abort_all();
                    while let Some(result) = self.tasks.join_next().await {
                        Self::record(&mut report, result);
                    }
                    break;
                }
            }
        }

        if report.is_clean() {
            info!(?report, "Engine tasks stopped");
        } else {
            error!(?report, "Engine tasks stopped with failures");
        }
        report
    }

    fn record(
        report: &mut ShutdownReport,
        result: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) {
        match Self::classify_task_result(result) {
            TaskTermination::Success => report.completed += 1,
            TaskTermination::Error => report.failed += 1,
            TaskTermination::Cancelled => report.cancelled += 1,
            TaskTermination::Panic => report.panicked += 1,
        }
    }

    fn classify_task_result(
        result: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) -> TaskTermination {
        match result {
            Ok(Ok(())) => TaskTermination::Success,
            Ok(Err(error)) => {
                error!(%error, "Engine task failed");
                TaskTermination::Error
            }
            Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
            Err(e) => {
                error!(error = %e, "Engine task panicked");
                TaskTermination::Panic
            }
        }
    }
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self::new()
    }
}
