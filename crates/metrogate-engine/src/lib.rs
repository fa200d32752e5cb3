//! Access-control and crossing-detection engine for the metrogate turnstile.
//!
//! The engine turns a credential decision, the door actuator's state and
//! two asynchronous beam-sensor signals into a single authoritative crossing
//! event, keeps the live counters, and reports everything as telemetry.
//!
//! # Components
//!
//! - [`crossing`]: two-beam crossing detector
//! - [`door`]: door state machine with actuator and open-wait timers
//! - [`cycle`]: door and detector under one lock
//! - [`gate`]: credential checks and access attempts
//! - [`counters`]: people inside, daily totals, sessions
//! - [`session`], [`registry`]: sessions, login lockout, credentials
//! - [`engine`]: [`AccessEngine`], the entry point for API and sensor loop
//! - [`driver`]: sensor loop, status reporter and task runtime
//!
//! # Example
//!
//! ```no_run
//! use metrogate_engine::driver::{EngineRuntime, LoopConfig, SensorLoop, StatusReporter};
//! use metrogate_engine::registry::CredentialRegistry;
//! use metrogate_engine::{AccessEngine, EngineConfig};
//! use metrogate_hardware::mock::{MockActuator, MockBeamSensor};
//! use metrogate_hardware::{AnyBeamSensor, AnyDoorActuator};
//! use metrogate_telemetry::{PipelineConfig, TelemetryPipeline};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = TelemetryPipeline::new(PipelineConfig::default());
//!     let engine = Arc::new(AccessEngine::new(
//!         EngineConfig::default(),
//!         CredentialRegistry::with_default_accounts(),
//!         pipeline.handle(),
//!     ));
//!
//!     let (sensor, _beams) = MockBeamSensor::new();
//!     let (actuator, _door) = MockActuator::new();
//!
//!     let mut runtime = EngineRuntime::new();
//!     let sensor_loop = SensorLoop::new(
//!         engine.clone(),
//!         AnyBeamSensor::Mock(sensor),
//!         AnyDoorActuator::Mock(actuator),
//!         LoopConfig::default(),
//!     );
//!     runtime.spawn(sensor_loop.run(runtime.shutdown_signal()));
//!     runtime.spawn(StatusReporter::with_default_interval(engine.clone()).run(runtime.shutdown_signal()));
//!
//!     engine.login("usuario1", "pass123").unwrap();
//!     engine.press_button("usuario1");
//!
//!     runtime.shutdown(Duration::from_secs(5)).await;
//! }
//! ```

pub mod audit;
pub mod counters;
pub mod crossing;
pub mod cycle;
pub mod door;
pub mod driver;
pub mod engine;
pub mod error;
pub mod gate;
pub mod registry;
pub mod session;

pub use counters::{CounterName, CounterSnapshot, CounterStore};
pub use crossing::{CrossingConfig, CrossingDetector, CrossingEvent};
pub use door::{DoorConfig, DoorController, DoorTransition};
pub use engine::{AccessEngine, EngineConfig};
pub use error::{EngineError, LoginError, Result};
pub use gate::{AccessAttempt, GateConfig, GateMode};
pub use session::{Session, SessionConfig, SessionPolicy};
