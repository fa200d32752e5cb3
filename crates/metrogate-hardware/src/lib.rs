//! Hardware abstraction layer for the metrogate turnstile.
//!
//! The engine talks to two peripherals: a pair of beam sensors across the
//! passage and the door actuator. This crate defines their traits, an enum
//! dispatch wrapper for each, mock implementations, and the sampler that
//! turns level readings into beam edges.
//!
//! # Beam Sensors
//!
//! ```no_run
//! use metrogate_hardware::{BeamSampler, BeamSensor};
//! use metrogate_hardware::error::Result;
//! use std::time::Instant;
//!
//! async fn poll_once<S: BeamSensor>(sensor: &mut S, sampler: &mut BeamSampler) -> Result<()> {
//!     let levels = sensor.read_levels().await?;
//!     for sample in sampler.update(levels, Instant::now()) {
//!         println!("{} occluded={}", sample.sensor, sample.occluded);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Door Actuator
//!
//! Commands are logical (`open`/`close`); PWM or servo control is the
//! actuator's business. Confirmation arrives asynchronously through
//! [`DoorActuator::poll_confirmation`].
//!
//! # Thread Safety
//!
//! All traits require `Send + Sync` so devices can move into the spawned
//! sensor loop.

pub mod devices;
pub mod error;
pub mod mock;
pub mod sampler;
pub mod traits;
pub mod types;

pub use devices::{AnyBeamSensor, AnyDoorActuator};
pub use error::{HardwareError, Result};
pub use sampler::BeamSampler;
pub use traits::{BeamSensor, DoorActuator};
pub use types::{ActuatorPosition, BeamLevels, BeamSample, DeviceInfo, DoorCommand};
