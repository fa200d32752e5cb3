//! The four measurements the dashboard reads.
//!
//! | measurement           | tags                          | fields |
//! |-----------------------|-------------------------------|--------|
//! | `metro_access`        | door, user, access_status     | access_id, access_granted, reason |
//! | `metro_login`         | username, role, status        | user_name, success |
//! | `metro_system_status` | status                        | counters, degraded, telemetry lag |
//! | `metro_door_status`   | door_status                   | is_open, detecting_crossing, laser levels, state |

use chrono::{DateTime, Utc};
use metrogate_core::constants::{
    MEASUREMENT_ACCESS, MEASUREMENT_DOOR_STATUS, MEASUREMENT_LOGIN, MEASUREMENT_SYSTEM_STATUS,
};
use metrogate_core::{AccessOutcome, DenyReason, DoorState, Role};

use crate::point::TelemetryPoint;

/// One access attempt.
#[derive(Debug, Clone)]
pub struct AccessPoint<'a> {
    pub door: &'a str,
    pub user: &'a str,
    pub access_id: u64,
    pub outcome: AccessOutcome,
    pub reason: Option<DenyReason>,
    pub at: DateTime<Utc>,
}

/// One login attempt.
#[derive(Debug, Clone)]
pub struct LoginPoint<'a> {
    pub username: &'a str,
    pub user_name: &'a str,
    /// `None` for unknown usernames; the tag is then omitted.
    pub role: Option<Role>,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// Periodic counter snapshot plus health indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemStatus {
    pub active_sessions: u64,
    pub people_inside: u64,
    pub total_access_today: u64,
    pub total_rejected_today: u64,
    pub button_enabled: bool,
    /// Door in `FAULT` or telemetry backend down.
    pub degraded: bool,
    pub telemetry_dropped: u64,
    pub telemetry_buffered: u64,
}

/// Door state after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorStatus {
    pub state: DoorState,
    pub detecting_crossing: bool,
    pub crossing_stalled: bool,
    pub laser_a_active: bool,
    pub laser_b_active: bool,
}

/// `metro_access` point.
pub fn access(point: &AccessPoint<'_>) -> TelemetryPoint {
    TelemetryPoint::builder(MEASUREMENT_ACCESS)
        .tag("door", point.door)
        .tag("user", point.user)
        .tag("access_status", point.outcome.as_str())
        .field("access_id", point.access_id)
        .field("access_granted", point.outcome.is_granted())
        .field(
            "reason",
            point.reason.map_or("granted", DenyReason::as_str),
        )
        .timestamp(point.at)
        .finish()
}

/// `metro_login` point.
pub fn login(point: &LoginPoint<'_>) -> TelemetryPoint {
    TelemetryPoint::builder(MEASUREMENT_LOGIN)
        .tag("username", point.username)
        .tag("role", point.role.map_or("", Role::as_str))
        .tag("status", if point.success { "success" } else { "failed" })
        .field("user_name", point.user_name)
        .field("success", point.success)
        .timestamp(point.at)
        .finish()
}

/// `metro_system_status` point.
pub fn system_status(status: &SystemStatus, at: DateTime<Utc>) -> TelemetryPoint {
    let tag = if status.active_sessions > 0 {
        "active"
    } else {
        "waiting"
    };

    TelemetryPoint::builder(MEASUREMENT_SYSTEM_STATUS)
        .tag("status", tag)
        .field("active_sessions", status.active_sessions)
        .field("total_access_today", status.total_access_today)
        .field("total_rejected_today", status.total_rejected_today)
        .field("people_inside", status.people_inside)
        .field("button_enabled", status.button_enabled)
        .field("degraded", status.degraded)
        .field("telemetry_dropped", status.telemetry_dropped)
        .field("telemetry_buffered", status.telemetry_buffered)
        .timestamp(at)
        .finish()
}

/// `metro_door_status` point.
pub fn door_status(status: &DoorStatus, at: DateTime<Utc>) -> TelemetryPoint {
    TelemetryPoint::builder(MEASUREMENT_DOOR_STATUS)
        .tag("door_status", status.state.status_label())
        .field("is_open", status.state.is_open())
        .field("detecting_crossing", status.detecting_crossing)
        .field("crossing_stalled", status.crossing_stalled)
        .field("laser_a_active", status.laser_a_active)
        .field("laser_b_active", status.laser_b_active)
        .field("state", status.state.as_str())
        .timestamp(at)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::FieldValue;

    #[test]
    fn test_access_point_granted() {
        let point = access(&AccessPoint {
            door: "canceladora_1",
            user: "card-42",
            access_id: 7,
            outcome: AccessOutcome::Granted,
            reason: None,
            at: Utc::now(),
        });

        assert_eq!(point.measurement(), "metro_access");
        assert_eq!(point.tag("access_status"), Some("granted"));
        assert_eq!(point.tag("user"), Some("card-42"));
        assert_eq!(point.field("access_id"), Some(&FieldValue::Integer(7)));
        assert_eq!(point.field("access_granted"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn test_access_point_denied_reason() {
        let point = access(&AccessPoint {
            door: "canceladora_1",
            user: "card-999",
            access_id: 8,
            outcome: AccessOutcome::Denied,
            reason: Some(DenyReason::UnknownCredential),
            at: Utc::now(),
        });

        assert_eq!(point.tag("access_status"), Some("denied"));
        assert_eq!(
            point.field("reason").and_then(FieldValue::as_str),
            Some("unknown_credential")
        );
    }

    #[test]
    fn test_login_point() {
        let point = login(&LoginPoint {
            username: "admin",
            user_name: "Administrador",
            role: Some(Role::Admin),
            success: false,
            at: Utc::now(),
        });

        assert_eq!(point.tag("role"), Some("admin"));
        assert_eq!(point.tag("status"), Some("failed"));
        assert_eq!(point.field("success"), Some(&FieldValue::Boolean(false)));
    }

    #[test]
    fn test_login_point_unknown_user() {
        let point = login(&LoginPoint {
            username: "intruder",
            user_name: "Unknown",
            role: None,
            success: false,
            at: Utc::now(),
        });

        assert!(point.tag("role").is_none());
        assert_eq!(point.tag("username"), Some("intruder"));
    }

    #[test]
    fn test_system_status_tag() {
        let waiting = system_status(&SystemStatus::default(), Utc::now());
        assert_eq!(waiting.tag("status"), Some("waiting"));

        let active = system_status(
            &SystemStatus {
                active_sessions: 2,
                people_inside: 5,
                ..SystemStatus::default()
            },
            Utc::now(),
        );
        assert_eq!(active.tag("status"), Some("active"));
        assert_eq!(active.field("people_inside"), Some(&FieldValue::Integer(5)));
    }

    #[test]
    fn test_door_status_point() {
        let point = door_status(
            &DoorStatus {
                state: DoorState::Crossing,
                detecting_crossing: true,
                crossing_stalled: false,
                laser_a_active: true,
                laser_b_active: false,
            },
            Utc::now(),
        );

        assert_eq!(point.tag("door_status"), Some("ABIERTA"));
        assert_eq!(point.field("is_open"), Some(&FieldValue::Boolean(true)));
        assert_eq!(
            point.field("state").and_then(FieldValue::as_str),
            Some("CROSSING")
        );
    }
}
