//! Sessions and login lockout.
//!
//! A session is opened by a successful login or by a granted card tap. It
//! ends on logout, after `timeout` without activity, or when the door cycle
//! it authorized ends, depending on [`SessionPolicy`]. Card-tap sessions
//! always end with their cycle.

use chrono::{DateTime, Utc};
use metrogate_core::constants::{
    DEFAULT_LOCKOUT_SECS, DEFAULT_MAX_LOGIN_ATTEMPTS, DEFAULT_SESSION_TIMEOUT_SECS,
};
use metrogate_core::{CredentialId, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LoginError;
use crate::registry::Credential;

/// What happens to a login session after the door cycle it authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// The session ends with the cycle.
    #[default]
    OneShot,
    /// The session survives and expires only after `timeout` of inactivity.
    IdleTimeout,
}

/// How a session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    Login,
    CardTap,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub credential: CredentialId,
    pub display_name: String,
    pub role: Role,
    pub origin: SessionOrigin,
    /// Wall-clock start, for display.
    pub opened_at: DateTime<Utc>,
    #[serde(skip)]
    pub started_at: Instant,
    #[serde(skip)]
    pub last_activity: Instant,
    /// A door cycle was granted under this session.
    pub granted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub policy: SessionPolicy,
    pub timeout: Duration,
    pub max_login_attempts: u32,
    pub lockout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout: Duration::from_secs(DEFAULT_LOCKOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LoginFailures {
    count: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

impl LoginFailures {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            last_failure: now,
            locked_until: None,
        }
    }

    /// The lock has run out, or no failure happened within `window`.
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        match self.locked_until {
            Some(until) => now >= until,
            None => now.saturating_duration_since(self.last_failure) > window,
        }
    }
}

/// Active sessions and failed-login bookkeeping.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: HashMap<CredentialId, Session>,
    failures: HashMap<String, LoginFailures>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// # Errors
    ///
    /// `LoginError::LockedOut` while `username` is locked.
    pub fn check_lockout(&mut self, username: &str, now: Instant) -> Result<(), LoginError> {
        let Some(failures) = self.failures.get(username) else {
            return Ok(());
        };

        match failures.locked_until {
            Some(until) if now < until => Err(LoginError::LockedOut {
                remaining_secs: until.duration_since(now).as_secs().max(1),
            }),
            Some(_) => {
                debug!(username, "Login lockout expired");
                self.failures.remove(username);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Count one failed login. Returns `true` if this failure locked the
    /// username.
    pub fn record_failure(&mut self, username: &str, now: Instant) -> bool {
        let max = self.config.max_login_attempts.max(1);
        let window = self.config.lockout;
        let failures = self
            .failures
            .entry(username.to_string())
            .or_insert_with(|| LoginFailures::new(now));
        if failures.is_stale(now, window) {
            *failures = LoginFailures::new(now);
        }
        failures.count += 1;
        failures.last_failure = now;

        if failures.count >= max {
            failures.count = 0;
            failures.locked_until = Some(now + self.config.lockout);
            warn!(
                username,
                lockout_secs = self.config.lockout.as_secs(),
                "Too many failed logins, username locked"
            );
            return true;
        }
        false
    }

    pub fn clear_failures(&mut self, username: &str) {
        self.failures.remove(username);
    }

    /// Open (or replace) the session of `credential`.
    pub fn open(&mut self, credential: &Credential, origin: SessionOrigin, now: Instant) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            credential: credential.id.clone(),
            display_name: credential.display_name.clone(),
            role: credential.role,
            origin,
            opened_at: Utc::now(),
            started_at: now,
            last_activity: now,
            granted: false,
        };

        if self.sessions.insert(credential.id.clone(), session.clone()).is_some() {
            debug!(credential = %credential.id, "Replaced existing session");
        }
        info!(credential = %credential.id, session = %session.id, origin = ?origin, "Session opened");
        session
    }

    /// Live session of `id`, if it has not timed out.
    pub fn active(&self, id: &CredentialId, now: Instant) -> Option<&Session> {
        self.sessions
            .get(id)
            .filter(|session| !self.is_expired(session, now))
    }

    pub fn touch(&mut self, id: &CredentialId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.last_activity = now;
        }
    }

    pub fn mark_granted(&mut self, id: &CredentialId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.granted = true;
            session.last_activity = now;
        }
    }

    /// Logout.
    pub fn close(&mut self, id: &CredentialId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        info!(credential = %id, session = %session.id, "Session closed");
        Some(session)
    }

    /// The door cycle authorized by `id` ended. Returns the session if it
    /// was removed.
    pub fn consume(&mut self, id: &CredentialId, now: Instant) -> Option<Session> {
        let session = self.sessions.get_mut(id)?;
        let keep = session.origin == SessionOrigin::Login
            && self.config.policy == SessionPolicy::IdleTimeout;

        if keep {
            session.granted = false;
            session.last_activity = now;
            return None;
        }

        let session = self.sessions.remove(id)?;
        debug!(credential = %id, session = %session.id, "Session consumed by door cycle");
        Some(session)
    }

    /// Remove expired sessions and forget failed logins that can no longer
    /// lead to a lockout.
    pub fn sweep(&mut self, now: Instant) -> Vec<Session> {
        let window = self.config.lockout;
        let before = self.failures.len();
        self.failures.retain(|_, failures| !failures.is_stale(now, window));
        if self.failures.len() < before {
            debug!(pruned = before - self.failures.len(), "Stale login failures dropped");
        }

        let expired: Vec<CredentialId> = self
            .sessions
            .values()
            .filter(|session| self.is_expired(session, now))
            .map(|session| session.credential.clone())
            .collect();

        let removed: Vec<Session> = expired
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .collect();

        for session in &removed {
            info!(credential = %session.credential, session = %session.id, "Session expired");
        }
        removed
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// A logged-in user is present.
    pub fn has_login_session(&self) -> bool {
        self.sessions
            .values()
            .any(|session| session.origin == SessionOrigin::Login)
    }

    pub fn list(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        now.saturating_duration_since(session.last_activity) > self.config.timeout
    }
}
