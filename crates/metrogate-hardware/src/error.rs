//! Device errors.
//!
//! The engine turns these into door faults; nothing in this crate retries.

use crate::types::DoorCommand;

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The beam pair stopped answering reads.
    #[error("Beam sensor {device} not responding")]
    SensorUnavailable { device: String },

    /// The actuator did not accept a command.
    #[error("Actuator {device} refused {command}: {reason}")]
    CommandRefused {
        device: String,
        command: DoorCommand,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn sensor_unavailable(device: impl Into<String>) -> Self {
        Self::SensorUnavailable {
            device: device.into(),
        }
    }

    pub fn command_refused(
        device: impl Into<String>,
        command: DoorCommand,
        reason: impl Into<String>,
    ) -> Self {
        Self::CommandRefused {
            device: device.into(),
            command,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_unavailable_message() {
        let error = HardwareError::sensor_unavailable("beam pair");
        assert_eq!(error.to_string(), "Beam sensor beam pair not responding");
    }

    #[test]
    fn test_command_refused_message() {
        let error = HardwareError::command_refused("door", DoorCommand::Open, "motor stalled");
        assert!(matches!(
            error,
            HardwareError::CommandRefused {
                command: DoorCommand::Open,
                ..
            }
        ));
        assert_eq!(error.to_string(), "Actuator door refused open: motor stalled");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gpio line closed");
        let error: HardwareError = io.into();
        assert!(error.to_string().starts_with("I/O error"));
    }
}
