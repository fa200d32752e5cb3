//! Hardware device trait definitions.
//!
//! These traits are the contract between the engine's sensor loop and the
//! turnstile peripherals: a pair of beam sensors and the door actuator. Mock
//! and real implementations are interchangeable behind them.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{BeamLevels, DeviceInfo, DoorCommand};

/// Beam sensor pair abstraction.
///
/// The sensor loop reads both levels once per tick; turning level changes
/// into timestamped edges is done by [`BeamSampler`](crate::sampler::BeamSampler).
///
/// # Object Safety and Dynamic Dispatch
///
/// This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generics, or the [`AnyBeamSensor`](crate::devices::AnyBeamSensor)
/// enum wrapper when a concrete type is needed (for example to spawn the
/// sensor loop).
///
/// # Examples
///
/// ```no_run
/// use metrogate_hardware::traits::BeamSensor;
/// use metrogate_hardware::error::Result;
///
/// async fn anyone_in_gap<S: BeamSensor>(sensor: &mut S) -> Result<bool> {
///     let levels = sensor.read_levels().await?;
///     Ok(levels.any_occluded())
/// }
/// ```
pub trait BeamSensor: Send + Sync {
    /// Read the current level of both beams.
    ///
    /// # Errors
    ///
    /// Returns an error if the sensor cannot be read. Repeated failures are
    /// treated by the engine as a sensor dropout.
    async fn read_levels(&mut self) -> Result<BeamLevels>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

/// Door actuator abstraction.
///
/// Commands are fire-and-forget: `command` returns once the actuator accepted
/// the request, and the actuator later reports that the door reached the
/// requested position through [`poll_confirmation`](DoorActuator::poll_confirmation).
///
/// # Examples
///
/// ```no_run
/// use metrogate_hardware::traits::DoorActuator;
/// use metrogate_hardware::types::DoorCommand;
/// use metrogate_hardware::error::Result;
///
/// async fn open_and_wait<D: DoorActuator>(door: &mut D) -> Result<()> {
///     door.command(DoorCommand::Open).await?;
///     loop {
///         if let Some(DoorCommand::Open) = door.poll_confirmation().await? {
///             return Ok(());
///         }
///         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
///     }
/// }
/// ```
pub trait DoorActuator: Send + Sync {
    /// Send a logical open/close command.
    ///
    /// # Errors
    ///
    /// Returns an error if the actuator refuses the command or is unreachable.
    async fn command(&mut self, command: DoorCommand) -> Result<()>;

    /// Return the next confirmed command, if any, without waiting.
    async fn poll_confirmation(&mut self) -> Result<Option<DoorCommand>>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}
