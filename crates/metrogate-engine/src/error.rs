//! Error types for the engine.

use metrogate_hardware::HardwareError;
use metrogate_telemetry::TelemetryError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Reasons a login is refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account locked, retry in {remaining_secs}s")]
    LockedOut { remaining_secs: u64 },

    #[error("Credential disabled")]
    CredentialDisabled,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] metrogate_core::Error),

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrogate_core::{DoorState, Error};

    #[test]
    fn test_login_error_display() {
        assert_eq!(
            LoginError::LockedOut { remaining_secs: 60 }.to_string(),
            "Account locked, retry in 60s"
        );
    }

    #[test]
    fn test_core_error_is_transparent() {
        let error: EngineError = Error::DoorBusy {
            state: DoorState::Open,
        }
        .into();
        assert_eq!(error.to_string(), "Door busy (OPEN)");
    }
}
