//! Shared domain types for the metrogate turnstile engine.
//!
//! Everything that crosses a crate boundary lives here: credential
//! identifiers, roles, door states, crossing directions and the error
//! taxonomy used by the gate and door logic.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{AuthorizationError, Error, HardwareFaultKind, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
