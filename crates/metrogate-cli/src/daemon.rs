//! Task wiring for the `metrogate` daemon.

use anyhow::Context;
use metrogate_engine::AccessEngine;
use metrogate_engine::driver::{EngineRuntime, SensorLoop, ShutdownReport, StatusReporter};
use metrogate_engine::registry::CredentialRegistry;
use metrogate_hardware::mock::{MockActuator, MockActuatorHandle, MockBeamSensor, MockBeamSensorHandle};
use metrogate_hardware::{AnyBeamSensor, AnyDoorActuator};
use metrogate_telemetry::mock::MockBackend;
use metrogate_telemetry::{AnyBackend, InfluxBackend, TelemetryPipeline};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{BackendKind, Config};

/// A running engine with its sensor loop, status reporter and telemetry
/// writer.
///
/// The beam sensor and actuator are the in-process mock devices; their
/// handles are exposed so a bench rig or test can drive the door.
#[derive(Debug)]
pub struct Daemon {
    engine: Arc<AccessEngine>,
    runtime: EngineRuntime,
    beams: MockBeamSensorHandle,
    door: MockActuatorHandle,
    grace: Duration,
}

impl Daemon {
    /// Build the engine and spawn its tasks. Must run inside a tokio runtime.
    pub fn start(config: &Config) -> anyhow::Result<Self> {
        let registry = CredentialRegistry::from_seeds(config.credentials.clone())
            .context("Invalid [[credentials]] entry")?;

        let backend = match config.telemetry.backend {
            BackendKind::Influx => AnyBackend::Influx(
                InfluxBackend::new(config.telemetry.influx.clone())
                    .context("Failed to create InfluxDB backend")?,
            ),
            BackendKind::Mock => {
                warn!("Telemetry backend is in-memory, points are not persisted");
                AnyBackend::Mock(MockBackend::new().0)
            }
        };

        let pipeline = TelemetryPipeline::new(config.pipeline_config());
        let engine = Arc::new(AccessEngine::new(
            config.engine_config(),
            registry,
            pipeline.handle(),
        ));

        let (sensor, beams) = MockBeamSensor::new();
        let (actuator, door) = MockActuator::new();
        info!("Using mock beam sensor and door actuator");

        let mut runtime = EngineRuntime::new();

        let writer = pipeline.into_writer(backend);
        let writer_shutdown = runtime.shutdown_signal();
        runtime.spawn(async move {
            writer.run(writer_shutdown).await;
            Ok(())
        });

        let sensor_loop = SensorLoop::new(
            engine.clone(),
            AnyBeamSensor::Mock(sensor),
            AnyDoorActuator::Mock(actuator),
            config.loop_config(),
        );
        runtime.spawn(sensor_loop.run(runtime.shutdown_signal()));

        let reporter = StatusReporter::new(engine.clone(), config.status_interval());
        runtime.spawn(reporter.run(runtime.shutdown_signal()));

        info!(tasks = runtime.len(), "Daemon started");
        Ok(Self {
            engine,
            runtime,
            beams,
            door,
            grace: config.shutdown_grace(),
        })
    }

    pub fn engine(&self) -> &Arc<AccessEngine> {
        &self.engine
    }

    pub fn beams(&self) -> &MockBeamSensorHandle {
        &self.beams
    }

    pub fn door(&self) -> &MockActuatorHandle {
        &self.door
    }

    /// Stop every task, waiting up to the configured grace period.
    pub async fn shutdown(self) -> ShutdownReport {
        info!(grace_ms = self.grace.as_millis() as u64, "Daemon shutting down");
        self.runtime.shutdown(self.grace).await
    }
}
