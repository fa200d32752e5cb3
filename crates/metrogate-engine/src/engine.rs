//! The access engine: gate, door cycle, sessions and counters wired together.
//!
//! [`AccessEngine`] is the single entry point for both the API layer
//! (authorize, login, registry management, administrative actions) and the
//! sensor loop (beam edges, timers, actuator confirmations). It is shared as
//! `Arc<AccessEngine>`; every method takes `&self`.
//!
//! # Locking
//!
//! The door cycle, the counters, the sessions and the registry each sit
//! behind their own lock. A method holds at most one of them at a time,
//! except that session-derived counters are published while the sessions
//! guard is held (sessions, then counters, never the reverse). No guard
//! lives across an `.await`; telemetry is enqueued after the guards are
//! released.
//!
//! # Examples
//!
//! ```
//! use metrogate_engine::{AccessEngine, EngineConfig};
//! use metrogate_engine::registry::{Credential, CredentialRegistry};
//! use metrogate_core::{CredentialId, DoorState, Role};
//! use metrogate_telemetry::{PipelineConfig, TelemetryPipeline};
//!
//! let mut registry = CredentialRegistry::new();
//! registry
//!     .add(Credential::card(CredentialId::new("card-42").unwrap(), "Card 42", Role::User))
//!     .unwrap();
//!
//! let telemetry = TelemetryPipeline::new(PipelineConfig::default()).handle();
//! let engine = AccessEngine::new(EngineConfig::default(), registry, telemetry);
//!
//! let attempt = engine.authorize("card-42");
//! assert!(attempt.is_granted());
//! assert_eq!(engine.door_state(), DoorState::Opening);
//! ```

use chrono::{Local, NaiveDate, Utc};
use metrogate_core::constants::{DEFAULT_CAPACITY, DEFAULT_DOOR_ID};
use metrogate_core::{CredentialId, DoorState, HardwareFaultKind, Role};
use metrogate_hardware::{BeamLevels, BeamSample, DoorCommand};
use metrogate_telemetry::TelemetryHandle;
use metrogate_telemetry::measurements::{DoorStatus, SystemStatus};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::audit::AuditSink;
use crate::counters::{CounterSnapshot, CounterStore};
use crate::crossing::CrossingConfig;
use crate::cycle::{CycleOutcome, DoorCycle};
use crate::door::{DoorConfig, DoorTransition};
use crate::error::{LoginError, Result};
use crate::gate::{AccessAttempt, CredentialGate, GateConfig, GateMode};
use crate::registry::{Credential, CredentialRegistry};
use crate::session::{Session, SessionConfig, SessionOrigin, SessionRegistry};

/// Monotonic time on tokio's clock, so paused-time tests stay
/// deterministic. Falls back to the system clock outside a runtime.
pub(crate) fn monotonic_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Value of the `door` tag on access points.
    pub door_id: String,
    pub gate: GateConfig,
    pub door: DoorConfig,
    pub crossing: CrossingConfig,
    pub session: SessionConfig,
    /// Upper bound of `people_inside`.
    pub capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            door_id: DEFAULT_DOOR_ID.to_string(),
            gate: GateConfig::default(),
            door: DoorConfig::default(),
            crossing: CrossingConfig::default(),
            session: SessionConfig::default(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Access-control and crossing-detection engine for one door.
#[derive(Debug)]
pub struct AccessEngine {
    registry: Arc<RwLock<CredentialRegistry>>,
    sessions: Arc<Mutex<SessionRegistry>>,
    cycle: Arc<Mutex<DoorCycle>>,
    counters: Arc<CounterStore>,
    gate: CredentialGate,
    audit: AuditSink,
}

impl AccessEngine {
    /// Create an engine with a closed door and zeroed counters for today.
    pub fn new(config: EngineConfig, registry: CredentialRegistry, telemetry: TelemetryHandle) -> Self {
        Self::with_day(config, registry, telemetry, Local::now().date_naive())
    }

    /// Like [`new`](Self::new) with an explicit counter day.
    pub fn with_day(
        config: EngineConfig,
        registry: CredentialRegistry,
        telemetry: TelemetryHandle,
        day: NaiveDate,
    ) -> Self {
        let registry = Arc::new(RwLock::new(registry));
        let sessions = Arc::new(Mutex::new(SessionRegistry::new(config.session)));
        let cycle = Arc::new(Mutex::new(DoorCycle::new(config.door, config.crossing)));
        let counters = Arc::new(CounterStore::with_capacity(day, config.capacity));
        let audit = AuditSink::new(telemetry, config.door_id.clone());

        let gate = CredentialGate::new(
            config.gate,
            registry.clone(),
            sessions.clone(),
            cycle.clone(),
            counters.clone(),
            audit.clone(),
        );

        info!(
            door = %config.door_id,
            mode = ?config.gate.mode,
            policy = ?config.session.policy,
            capacity = config.capacity,
            "Access engine created"
        );

        Self {
            registry,
            sessions,
            cycle,
            counters,
            gate,
            audit,
        }
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        self.audit.telemetry()
    }

    // ------------------------------------------------------------------
    // Gate
    // ------------------------------------------------------------------

    pub fn authorize(&self, credential: &str) -> AccessAttempt {
        self.authorize_at(credential, monotonic_now())
    }

    pub fn authorize_at(&self, credential: &str, now: Instant) -> AccessAttempt {
        self.gate.authorize(credential, now)
    }

    /// Door button pressed by a logged-in user.
    pub fn press_button(&self, username: &str) -> AccessAttempt {
        self.press_button_at(username, monotonic_now())
    }

    pub fn press_button_at(&self, username: &str, now: Instant) -> AccessAttempt {
        self.gate.authorize_in(GateMode::SessionRequired, username, now)
    }

    /// Password login.
    ///
    /// # Errors
    ///
    /// - `LoginError::LockedOut` after too many failures
    /// - `LoginError::InvalidCredentials` for an unknown user or wrong password
    /// - `LoginError::CredentialDisabled` for a disabled account
    pub fn login(&self, username: &str, password: &str) -> std::result::Result<Session, LoginError> {
        self.login_at(username, password, monotonic_now())
    }

    pub fn login_at(
        &self,
        username: &str,
        password: &str,
        now: Instant,
    ) -> std::result::Result<Session, LoginError> {
        let raw = username;
        // Lockout key and audit label, bounded and printable.
        let label = CredentialId::label_for(raw);
        let username = label.as_str();

        if let Err(error) = self.sessions.lock().check_lockout(username, now) {
            warn!(username, %error, "Login refused");
            return Err(error);
        }

        let credential = CredentialId::new(raw)
            .ok()
            .and_then(|id| self.registry.read().get(&id))
            .filter(|credential| credential.verify_password(password));

        let Some(credential) = credential else {
            self.sessions.lock().record_failure(username, now);
            self.audit.login(username, "Unknown", None, false);
            warn!(username, "Login failed");
            return Err(LoginError::InvalidCredentials);
        };

        if !credential.enabled {
            self.audit
                .login(username, &credential.display_name, Some(credential.role), false);
            warn!(username, "Login refused, credential disabled");
            return Err(LoginError::CredentialDisabled);
        }

        let session = {
            let mut sessions = self.sessions.lock();
            sessions.clear_failures(username);
            let session = sessions.open(&credential, SessionOrigin::Login, now);
            self.counters
                .publish_sessions(sessions.len() as u64, sessions.has_login_session());
            session
        };
        self.audit
            .login(username, &credential.display_name, Some(credential.role), true);
        info!(username, role = %credential.role, "Login successful");
        Ok(session)
    }

    /// End the session of `username`. Returns `false` if there was none.
    pub fn logout(&self, username: &str) -> bool {
        let Ok(id) = CredentialId::new(username) else {
            return false;
        };
        let closed = self.sessions.lock().close(&id).is_some();
        if closed {
            self.sync_session_counters();
        }
        closed
    }

    /// Live session of `username`.
    pub fn session(&self, username: &str) -> Option<Session> {
        let id = CredentialId::new(username).ok()?;
        self.sessions.lock().active(&id, monotonic_now()).cloned()
    }

    // ------------------------------------------------------------------
    // Door and counters
    // ------------------------------------------------------------------

    pub fn door_state(&self) -> DoorState {
        self.cycle.lock().state()
    }

    pub fn door_status(&self) -> DoorStatus {
        self.cycle.lock().status()
    }

    /// Last `count` door transitions, oldest first.
    pub fn door_history(&self, count: usize) -> Vec<DoorTransition> {
        self.cycle.lock().door().last_transitions(count)
    }

    pub fn levels(&self) -> BeamLevels {
        self.cycle.lock().levels()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Administrative fault clear.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the door is not in `FAULT`.
    pub fn clear_fault(&self) -> Result<()> {
        self.clear_fault_at(monotonic_now())
    }

    pub fn clear_fault_at(&self, now: Instant) -> Result<()> {
        let result = {
            let mut cycle = self.cycle.lock();
            cycle.clear_fault(now).map(|outcome| (outcome, cycle.status()))
        };
        let (outcome, status) = result?;
        self.apply(outcome, status, now);
        Ok(())
    }

    /// Administrative reset of the daily totals and `people_inside`.
    pub fn reset_counters(&self) {
        self.counters.reset();
    }

    /// Current status snapshot for the dashboard.
    pub fn system_status(&self) -> SystemStatus {
        let counters = self.counters.snapshot();
        let stats = self.audit.telemetry().stats();
        let faulted = self.door_state() == DoorState::Fault;

        SystemStatus {
            active_sessions: counters.active_sessions,
            people_inside: counters.people_inside,
            total_access_today: counters.total_access_today,
            total_rejected_today: counters.total_rejected_today,
            button_enabled: counters.button_enabled,
            degraded: faulted || !stats.healthy,
            telemetry_dropped: stats.dropped,
            telemetry_buffered: stats.buffered as u64,
        }
    }

    /// Enqueue one `metro_system_status` point.
    pub fn report_status(&self) -> SystemStatus {
        let status = self.system_status();
        self.audit.system(&status);
        status
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `Error::DuplicateCredential` if the id is taken.
    pub fn add_credential(&self, credential: Credential) -> Result<()> {
        Ok(self.registry.write().add(credential)?)
    }

    /// # Errors
    ///
    /// Returns `Error::CredentialNotFound` for an unknown id.
    pub fn update_credential(
        &self,
        id: &CredentialId,
        display_name: Option<String>,
        role: Option<Role>,
    ) -> Result<Credential> {
        Ok(self.registry.write().update(id, display_name, role)?)
    }

    /// Disabling a credential also ends its session.
    ///
    /// # Errors
    ///
    /// Returns `Error::CredentialNotFound` for an unknown id.
    pub fn set_credential_enabled(&self, id: &CredentialId, enabled: bool) -> Result<()> {
        self.registry.write().set_enabled(id, enabled)?;
        if !enabled && self.sessions.lock().close(id).is_some() {
            self.sync_session_counters();
        }
        Ok(())
    }

    /// Removing a credential also ends its session.
    ///
    /// # Errors
    ///
    /// Returns `Error::CredentialNotFound` for an unknown id.
    pub fn remove_credential(&self, id: &CredentialId) -> Result<Credential> {
        let credential = self.registry.write().remove(id)?;
        if self.sessions.lock().close(id).is_some() {
            self.sync_session_counters();
        }
        Ok(credential)
    }

    pub fn credential(&self, id: &CredentialId) -> Option<Credential> {
        self.registry.read().get(id)
    }

    pub fn credentials(&self) -> Vec<Credential> {
        self.registry.read().list()
    }

    // ------------------------------------------------------------------
    // Sensor loop
    // ------------------------------------------------------------------

    /// Feed one beam edge.
    pub fn observe(&self, sample: BeamSample) {
        let (outcome, status) = {
            let mut cycle = self.cycle.lock();
            (cycle.observe(sample), cycle.status())
        };
        self.apply(outcome, status, sample.at);
    }

    /// Apply detector and door timers.
    pub fn tick(&self, now: Instant) {
        let (outcome, status) = {
            let mut cycle = self.cycle.lock();
            (cycle.tick(now), cycle.status())
        };
        self.apply(outcome, status, now);
    }

    /// Hardware failure. No-op if the door is already in `FAULT`.
    pub fn fault(&self, kind: HardwareFaultKind, now: Instant) {
        let (outcome, status) = {
            let mut cycle = self.cycle.lock();
            (cycle.fault(kind, now), cycle.status())
        };
        self.apply(outcome, status, now);
    }

    /// Next command for the actuator.
    pub fn take_command(&self) -> Option<DoorCommand> {
        self.cycle.lock().take_command()
    }

    /// Actuator confirmation.
    ///
    /// # Errors
    ///
    /// Propagates an invalid door transition.
    pub fn confirm(&self, command: DoorCommand, now: Instant) -> Result<()> {
        let result = {
            let mut cycle = self.cycle.lock();
            cycle
                .confirm(command, now)
                .map(|outcome| (outcome, cycle.status()))
        };
        let (outcome, status) = result?;
        self.apply(outcome, status, now);
        Ok(())
    }

    /// Periodic housekeeping: session expiry, cooldown pruning and day
    /// rollover.
    pub fn sweep(&self, now: Instant, today: NaiveDate) {
        let expired = self.sessions.lock().sweep(now);
        if !expired.is_empty() {
            self.sync_session_counters();
        }
        self.gate.prune_cooldowns(now);
        self.counters.roll_over(today);
    }

    fn apply(&self, outcome: CycleOutcome, status: DoorStatus, now: Instant) {
        if outcome.is_empty() {
            return;
        }

        self.audit.transitions(&outcome.transitions, status);

        // A stall changes no state; report it on its own.
        if outcome.crossing.is_some_and(|event| event.is_ambiguous()) {
            warn!("Crossing stalled in the gap, holding door open");
            self.audit.door(&status, Utc::now());
        }

        if let Some(event) = outcome.valid_crossing() {
            let counters = self.counters.record_crossing(event.direction);
            info!(
                direction = %event.direction,
                people_inside = counters.people_inside,
                total_access_today = counters.total_access_today,
                "Crossing counted"
            );
        }

        if let Some(end) = outcome.cycle_ended
            && let Some(credential) = end.credential
        {
            self.sessions.lock().consume(&credential, now);
            self.sync_session_counters();
        }
    }

    fn sync_session_counters(&self) {
        let sessions = self.sessions.lock();
        self.counters
            .publish_sessions(sessions.len() as u64, sessions.has_login_session());
    }
}
