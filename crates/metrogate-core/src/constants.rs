//! Default timings, limits and telemetry names for the metrogate engine.
//!
//! Every value here is a default: the daemon configuration can override the
//! timing and capacity values, the measurement names are fixed by the
//! dashboard contract.
//!
//! # Usage
//!
//! ```
//! use metrogate_core::constants::*;
//! use std::time::Duration;
//!
//! let dwell = Duration::from_millis(DEFAULT_DWELL_WINDOW_MS);
//! assert!(dwell > Duration::from_millis(DEFAULT_PARTIAL_TIMEOUT_MS));
//! assert_eq!(MEASUREMENT_ACCESS, "metro_access");
//! ```

// ============================================================================
// Credential Format Constraints
// ============================================================================

/// Minimum length of a credential identifier after trimming.
pub const MIN_CREDENTIAL_ID_LENGTH: usize = 1;

/// Maximum length of a credential identifier after trimming.
pub const MAX_CREDENTIAL_ID_LENGTH: usize = 64;

// ============================================================================
// Crossing Detection
// ============================================================================

/// Maximum time from the first occlusion until both beams clear (milliseconds).
///
/// A walking adult clears a 40cm beam pair in well under a second; slow
/// passengers with luggage take longer. Sequences that are still occluded past
/// this window are reported as stalled instead of counted.
pub const DEFAULT_DWELL_WINDOW_MS: u64 = 3000;

/// How long a single occluded beam waits for its pair (milliseconds).
///
/// Shorter than the dwell window: an arm or a bag swinging through one beam
/// should be forgotten quickly.
pub const DEFAULT_PARTIAL_TIMEOUT_MS: u64 = 1500;

// ============================================================================
// Door Timing
// ============================================================================

/// Time the actuator has to confirm an open or close command (milliseconds).
pub const DEFAULT_ACTUATOR_TIMEOUT_MS: u64 = 2000;

/// How long an open door waits for a crossing before closing (seconds).
pub const DEFAULT_MAX_OPEN_WAIT_SECS: u64 = 15;

/// Extra hold-open time after a stalled crossing (seconds).
pub const DEFAULT_STALL_HOLD_SECS: u64 = 10;

/// Number of door transitions kept in the in-memory history.
pub const DOOR_HISTORY_SIZE: usize = 100;

// ============================================================================
// Credential Gate
// ============================================================================

/// Minimum interval between two attempts of the same credential (milliseconds).
pub const DEFAULT_COOLDOWN_MS: u64 = 2000;

/// Idle session lifetime (seconds).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Failed logins tolerated before the username is locked.
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Lockout applied after too many failed logins (seconds).
pub const DEFAULT_LOCKOUT_SECS: u64 = 15 * 60;

// ============================================================================
// Counters
// ============================================================================

/// Maximum number of people the station area holds.
pub const DEFAULT_CAPACITY: u64 = 500;

// ============================================================================
// Loops
// ============================================================================

/// Beam sensor polling period (milliseconds).
pub const DEFAULT_SENSOR_TICK_MS: u64 = 10;

/// Session expiry and day rollover sweep period (milliseconds).
pub const DEFAULT_SESSION_SWEEP_MS: u64 = 1000;

/// System status snapshot period (milliseconds).
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;

/// Consecutive failed sensor reads before the door faults.
pub const DEFAULT_MAX_SENSOR_FAILURES: u32 = 3;

// ============================================================================
// Telemetry
// ============================================================================

/// Door identifier written in the `door` tag of access points.
pub const DEFAULT_DOOR_ID: &str = "canceladora_1";

/// Access attempts.
pub const MEASUREMENT_ACCESS: &str = "metro_access";

/// Login attempts.
pub const MEASUREMENT_LOGIN: &str = "metro_login";

/// Periodic counter snapshot.
pub const MEASUREMENT_SYSTEM_STATUS: &str = "metro_system_status";

/// Door state transitions.
pub const MEASUREMENT_DOOR_STATUS: &str = "metro_door_status";

/// Maximum points kept while the backend is unreachable.
pub const DEFAULT_TELEMETRY_BUFFER: usize = 10_000;

/// Points per backend write.
pub const DEFAULT_TELEMETRY_BATCH: usize = 500;
