//! Types exchanged between the engine and the turnstile hardware.

use metrogate_core::SensorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Generic device information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "Mock Beam Pair").
    pub name: String,

    /// Device model identifier.
    pub model: String,
}

impl DeviceInfo {
    /// Create a new DeviceInfo.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// Instantaneous reading of both beams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamLevels {
    /// Beam A is interrupted.
    pub a_occluded: bool,

    /// Beam B is interrupted.
    pub b_occluded: bool,
}

impl BeamLevels {
    /// Both beams clear.
    pub const CLEAR: BeamLevels = BeamLevels {
        a_occluded: false,
        b_occluded: false,
    };

    pub fn new(a_occluded: bool, b_occluded: bool) -> Self {
        Self {
            a_occluded,
            b_occluded,
        }
    }

    /// Level of one sensor.
    #[must_use]
    pub fn is_occluded(&self, sensor: SensorId) -> bool {
        match sensor {
            SensorId::A => self.a_occluded,
            SensorId::B => self.b_occluded,
        }
    }

    /// Copy with one sensor changed.
    #[must_use]
    pub fn with(mut self, sensor: SensorId, occluded: bool) -> Self {
        match sensor {
            SensorId::A => self.a_occluded = occluded,
            SensorId::B => self.b_occluded = occluded,
        }
        self
    }

    #[must_use]
    pub fn any_occluded(&self) -> bool {
        self.a_occluded || self.b_occluded
    }
}

/// A single beam edge: one sensor changed level at `at`.
///
/// Samples are transient. They are consumed by the crossing detector as soon
/// as they are produced and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamSample {
    pub sensor: SensorId,
    pub occluded: bool,
    pub at: Instant,
}

impl BeamSample {
    pub fn new(sensor: SensorId, occluded: bool, at: Instant) -> Self {
        Self {
            sensor,
            occluded,
            at,
        }
    }

    /// Shorthand for an occlusion edge.
    pub fn occluded(sensor: SensorId, at: Instant) -> Self {
        Self::new(sensor, true, at)
    }

    /// Shorthand for a clear edge.
    pub fn cleared(sensor: SensorId, at: Instant) -> Self {
        Self::new(sensor, false, at)
    }
}

/// Logical door command sent to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorCommand {
    Open,
    Close,
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorCommand::Open => write!(f, "open"),
            DoorCommand::Close => write!(f, "close"),
        }
    }
}

/// Last position the actuator confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorPosition {
    Closed,
    Open,
}

impl From<DoorCommand> for ActuatorPosition {
    fn from(command: DoorCommand) -> Self {
        match command {
            DoorCommand::Open => ActuatorPosition::Open,
            DoorCommand::Close => ActuatorPosition::Closed,
        }
    }
}
