//! Credential gate: decides whether an attempt may open the door.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. unknown credential
//! 2. credential disabled
//! 3. session required (session mode without an active session)
//! 4. cooldown (same credential within `cooldown`)
//! 5. the door accepts the open command (`DoorBusy`, `HardwareFault`)
//!
//! Every call yields exactly one [`AccessAttempt`] and one `metro_access`
//! point. Denials bump `total_rejected_today`.

use chrono::{DateTime, Utc};
use metrogate_core::constants::DEFAULT_COOLDOWN_MS;
use metrogate_core::{AccessOutcome, AuthorizationError, CredentialId, DenyReason, Error};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::audit::AuditSink;
use crate::counters::{CounterName, CounterStore};
use crate::cycle::DoorCycle;
use crate::registry::{Credential, CredentialRegistry};
use crate::session::{SessionOrigin, SessionRegistry};

/// Deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// A known, enabled card opens the door on its own.
    #[default]
    CardTap,
    /// The credential must hold an active login session.
    SessionRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub mode: GateMode,
    pub cooldown: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::default(),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
        }
    }
}

/// Record of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessAttempt {
    /// Monotonic sequence number, starting at 1.
    pub access_id: u64,
    pub at: DateTime<Utc>,
    /// `None` when the credential is unknown.
    pub credential: Option<CredentialId>,
    /// Display name, or the presented identifier when unknown.
    pub user: String,
    pub outcome: AccessOutcome,
    pub reason: Option<DenyReason>,
    /// Human-readable denial message for the API layer.
    pub detail: Option<String>,
}

impl AccessAttempt {
    pub fn is_granted(&self) -> bool {
        self.outcome.is_granted()
    }
}

enum Refusal {
    Authorization(AuthorizationError),
    Door(Error),
}

impl Refusal {
    fn reason(&self) -> DenyReason {
        match self {
            Refusal::Authorization(error) => DenyReason::from(error),
            Refusal::Door(Error::HardwareFault { kind }) => DenyReason::from(*kind),
            Refusal::Door(_) => DenyReason::DoorBusy,
        }
    }

    fn detail(&self) -> String {
        match self {
            Refusal::Authorization(error) => error.to_string(),
            Refusal::Door(error) => error.to_string(),
        }
    }
}

/// Credential gate for one door.
#[derive(Debug)]
pub struct CredentialGate {
    config: GateConfig,
    registry: Arc<RwLock<CredentialRegistry>>,
    sessions: Arc<Mutex<SessionRegistry>>,
    cycle: Arc<Mutex<DoorCycle>>,
    counters: Arc<CounterStore>,
    audit: AuditSink,
    cooldowns: Mutex<HashMap<CredentialId, Instant>>,
    next_id: AtomicU64,
}

impl CredentialGate {
    pub fn new(
        config: GateConfig,
        registry: Arc<RwLock<CredentialRegistry>>,
        sessions: Arc<Mutex<SessionRegistry>>,
        cycle: Arc<Mutex<DoorCycle>>,
        counters: Arc<CounterStore>,
        audit: AuditSink,
    ) -> Self {
        Self {
            config,
            registry,
            sessions,
            cycle,
            counters,
            audit,
            cooldowns: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide one attempt at `now` in the configured mode.
    pub fn authorize(&self, raw: &str, now: Instant) -> AccessAttempt {
        self.authorize_in(self.config.mode, raw, now)
    }

    /// Decide one attempt with an explicit mode. The door button always
    /// uses [`GateMode::SessionRequired`].
    pub fn authorize_in(&self, mode: GateMode, raw: &str, now: Instant) -> AccessAttempt {
        let access_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let at = Utc::now();

        let credential = CredentialId::new(raw)
            .ok()
            .and_then(|id| self.registry.read().get(&id));

        let attempt = match credential {
            None => {
                let refusal = Refusal::Authorization(AuthorizationError::UnknownCredential);
                self.deny(access_id, at, None, CredentialId::label_for(raw), refusal)
            }
            Some(credential) => {
                let user = credential.display_name.clone();
                match self.check(mode, &credential.id, credential.enabled, now) {
                    Ok(()) => {
                        self.grant(&credential, now);
                        AccessAttempt {
                            access_id,
                            at,
                            credential: Some(credential.id),
                            user,
                            outcome: AccessOutcome::Granted,
                            reason: None,
                            detail: None,
                        }
                    }
                    Err(refusal) => self.deny(access_id, at, Some(credential.id), user, refusal),
                }
            }
        };

        if attempt.is_granted() {
            info!(access_id, user = %attempt.user, "Access granted");
        } else {
            warn!(
                access_id,
                user = %attempt.user,
                reason = attempt.reason.map_or("", DenyReason::as_str),
                "Access denied"
            );
        }
        self.audit.access(&attempt);
        attempt
    }

    /// Forget cooldown entries older than the cooldown.
    pub fn prune_cooldowns(&self, now: Instant) {
        let cooldown = self.config.cooldown;
        self.cooldowns
            .lock()
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
    }

    fn check(
        &self,
        mode: GateMode,
        id: &CredentialId,
        enabled: bool,
        now: Instant,
    ) -> Result<(), Refusal> {
        if !enabled {
            return Err(Refusal::Authorization(AuthorizationError::CredentialDisabled));
        }

        if mode == GateMode::SessionRequired
            && self.sessions.lock().active(id, now).is_none()
        {
            return Err(Refusal::Authorization(AuthorizationError::SessionRequired));
        }

        self.check_cooldown(id, now).map_err(Refusal::Authorization)?;

        let (transition, status) = {
            let mut cycle = self.cycle.lock();
            let transition = cycle
                .request_open(Some(id.clone()), now)
                .map_err(Refusal::Door)?;
            (transition, cycle.status())
        };
        self.audit.transitions(&[transition], status);
        Ok(())
    }

    /// Cooldown check; the timestamp is only refreshed when the check passes.
    fn check_cooldown(&self, id: &CredentialId, now: Instant) -> Result<(), AuthorizationError> {
        let mut cooldowns = self.cooldowns.lock();
        if let Some(last) = cooldowns.get(id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.config.cooldown {
                let remaining = self.config.cooldown - elapsed;
                return Err(AuthorizationError::Cooldown {
                    remaining_ms: remaining.as_millis() as u64,
                });
            }
        }
        cooldowns.insert(id.clone(), now);
        Ok(())
    }

    fn grant(&self, credential: &Credential, now: Instant) {
        let mut sessions = self.sessions.lock();
        if sessions.active(&credential.id, now).is_none() {
            sessions.open(credential, SessionOrigin::CardTap, now);
        }
        sessions.mark_granted(&credential.id, now);
        self.counters
            .publish_sessions(sessions.len() as u64, sessions.has_login_session());
    }

    fn deny(
        &self,
        access_id: u64,
        at: DateTime<Utc>,
        credential: Option<CredentialId>,
        user: String,
        refusal: Refusal,
    ) -> AccessAttempt {
        self.counters.increment(CounterName::TotalRejectedToday);
        AccessAttempt {
            access_id,
            at,
            credential,
            user,
            outcome: AccessOutcome::Denied,
            reason: Some(refusal.reason()),
            detail: Some(refusal.detail()),
        }
    }
}
