//! Enum wrappers for hardware device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn BeamSensor>`
//! is not an option. The sensor loop instead owns one of these enums, which
//! gives it a concrete, `Send` type to spawn while keeping mock and real
//! devices interchangeable.
//!
//! # Examples
//!
//! ```
//! use metrogate_hardware::devices::{AnyBeamSensor, AnyDoorActuator};
//! use metrogate_hardware::mock::{MockActuator, MockBeamSensor};
//!
//! let (sensor, _sensor_handle) = MockBeamSensor::new();
//! let (actuator, _actuator_handle) = MockActuator::new();
//!
//! let sensor = AnyBeamSensor::Mock(sensor);
//! let actuator = AnyDoorActuator::Mock(actuator);
//! ```

use crate::mock::{MockActuator, MockBeamSensor};
use crate::traits::{BeamSensor, DoorActuator};
use crate::{BeamLevels, DeviceInfo, DoorCommand, Result};

/// Enum wrapper for beam sensor dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyBeamSensor {
    /// Mock beam pair for development and testing.
    Mock(MockBeamSensor),
}

impl BeamSensor for AnyBeamSensor {
    async fn read_levels(&mut self) -> Result<BeamLevels> {
        match self {
            Self::Mock(device) => device.read_levels().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}

/// Enum wrapper for door actuator dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyDoorActuator {
    /// Mock actuator for development and testing.
    Mock(MockActuator),
}

impl DoorActuator for AnyDoorActuator {
    async fn command(&mut self, command: DoorCommand) -> Result<()> {
        match self {
            Self::Mock(device) => device.command(command).await,
        }
    }

    async fn poll_confirmation(&mut self) -> Result<Option<DoorCommand>> {
        match self {
            Self::Mock(device) => device.poll_confirmation().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
        }
    }
}
