//! Turns engine events into telemetry points.

use chrono::{DateTime, Utc};
use metrogate_core::Role;
use metrogate_telemetry::TelemetryHandle;
use metrogate_telemetry::measurements::{self, AccessPoint, DoorStatus, LoginPoint, SystemStatus};

use crate::door::DoorTransition;
use crate::gate::AccessAttempt;

/// Telemetry producer for one door.
#[derive(Debug, Clone)]
pub struct AuditSink {
    telemetry: TelemetryHandle,
    door_id: String,
}

impl AuditSink {
    pub fn new(telemetry: TelemetryHandle, door_id: impl Into<String>) -> Self {
        Self {
            telemetry,
            door_id: door_id.into(),
        }
    }

    pub fn door_id(&self) -> &str {
        &self.door_id
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    pub fn access(&self, attempt: &AccessAttempt) {
        self.telemetry.enqueue(measurements::access(&AccessPoint {
            door: &self.door_id,
            user: &attempt.user,
            access_id: attempt.access_id,
            outcome: attempt.outcome,
            reason: attempt.reason,
            at: attempt.at,
        }));
    }

    pub fn login(&self, username: &str, user_name: &str, role: Option<Role>, success: bool) {
        self.telemetry.enqueue(measurements::login(&LoginPoint {
            username,
            user_name,
            role,
            success,
            at: Utc::now(),
        }));
    }

    pub fn door(&self, status: &DoorStatus, at: DateTime<Utc>) {
        self.telemetry.enqueue(measurements::door_status(status, at));
    }

    /// One `metro_door_status` point per transition. `status` is the cycle
    /// status after the last one; each point carries its own target state.
    pub fn transitions(&self, transitions: &[DoorTransition], status: DoorStatus) {
        let at = Utc::now();
        for transition in transitions {
            self.door(
                &DoorStatus {
                    state: transition.to,
                    ..status
                },
                at,
            );
        }
    }

    pub fn system(&self, status: &SystemStatus) {
        self.telemetry
            .enqueue(measurements::system_status(status, Utc::now()));
    }
}
