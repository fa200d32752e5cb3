use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::DoorState;

/// Reasons the credential gate refuses an attempt before the door is touched.
///
/// These are never fatal: the gate turns each one into a denied
/// `AccessAttempt` carrying the matching reason code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationError {
    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Credential disabled")]
    CredentialDisabled,

    #[error("An active session is required")]
    SessionRequired,

    #[error("Repeated attempt within cooldown, retry in {remaining_ms}ms")]
    Cooldown { remaining_ms: u64 },
}

/// Physical failures that move the door into `FAULT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareFaultKind {
    /// The actuator did not confirm an open/close command in time.
    ActuatorTimeout,
    /// The beam sensors stopped answering.
    SensorDropout,
    /// The actuator refused or failed a command.
    ActuatorFailure,
}

impl HardwareFaultKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HardwareFaultKind::ActuatorTimeout => "actuator_timeout",
            HardwareFaultKind::SensorDropout => "sensor_dropout",
            HardwareFaultKind::ActuatorFailure => "actuator_failure",
        }
    }
}

impl fmt::Display for HardwareFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Gate errors
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    // Door errors
    #[error("Hardware fault: {kind}")]
    HardwareFault { kind: HardwareFaultKind },

    #[error("Door busy ({state})")]
    DoorBusy { state: DoorState },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Registry errors
    #[error("Invalid credential id: {0}")]
    InvalidCredentialId(String),

    #[error("Credential already registered: {0}")]
    DuplicateCredential(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a hardware fault error.
    pub fn hardware_fault(kind: HardwareFaultKind) -> Self {
        Self::HardwareFault { kind }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
