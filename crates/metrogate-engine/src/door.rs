//! Door controller state machine.
//!
//! The controller owns the single [`DoorState`] of one door. It never talks
//! to the actuator itself: commands are queued and drained by the sensor
//! loop, and the actuator's confirmations are fed back through
//! [`confirm_open`](DoorController::confirm_open) and
//! [`confirm_closed`](DoorController::confirm_closed).
//!
//! # Valid Transitions
//!
//! - `Closed` → `Opening` → `Open` → `Closing` → `Closed`
//! - `Open` ⇄ `Crossing`, `Crossing` → `Closing`
//! - any state except `Fault` → `Fault`
//! - `Fault` → `Closed` via [`clear_fault`](DoorController::clear_fault)
//!
//! # Timers
//!
//! Each state may carry a deadline, checked by [`tick`](DoorController::tick):
//!
//! | state                | deadline                 | on expiry              |
//! |----------------------|--------------------------|------------------------|
//! | `Opening`, `Closing` | `actuator_timeout`       | `Fault(ActuatorTimeout)` |
//! | `Open`, `Crossing`   | `max_open_wait`          | `Closing` (abandoned)  |
//! | `Open`, `Crossing`   | `stall_hold` after stall | `Closing`              |
//!
//! # Examples
//!
//! ```
//! use metrogate_core::DoorState;
//! use metrogate_engine::door::DoorController;
//! use metrogate_hardware::DoorCommand;
//! use std::time::Instant;
//!
//! let mut door = DoorController::new();
//! let now = Instant::now();
//!
//! door.request_open(now).unwrap();
//! assert_eq!(door.state(), DoorState::Opening);
//! assert_eq!(door.take_command(), Some(DoorCommand::Open));
//!
//! door.confirm_open(now).unwrap();
//! assert_eq!(door.state(), DoorState::Open);
//! ```

use metrogate_core::constants::{
    DEFAULT_ACTUATOR_TIMEOUT_MS, DEFAULT_MAX_OPEN_WAIT_SECS, DEFAULT_STALL_HOLD_SECS,
    DOOR_HISTORY_SIZE,
};
use metrogate_core::{DoorState, Error, HardwareFaultKind, Result};
use metrogate_hardware::DoorCommand;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Door timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorConfig {
    /// Time the actuator has to confirm a command.
    pub actuator_timeout: Duration,
    /// How long an open door waits for a crossing.
    pub max_open_wait: Duration,
    /// Hold-open time after a stalled crossing.
    pub stall_hold: Duration,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            actuator_timeout: Duration::from_millis(DEFAULT_ACTUATOR_TIMEOUT_MS),
            max_open_wait: Duration::from_secs(DEFAULT_MAX_OPEN_WAIT_SECS),
            stall_hold: Duration::from_secs(DEFAULT_STALL_HOLD_SECS),
        }
    }
}

/// Why the door left its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    /// Access granted.
    OpenRequested,
    /// Actuator confirmed the last command.
    ActuatorConfirmed,
    /// Detector left or returned to idle.
    CrossingActivity,
    /// Valid crossing completed.
    Crossed,
    /// Nobody crossed within `max_open_wait`.
    Abandoned,
    /// Stall hold expired.
    StallHoldExpired,
    Fault(HardwareFaultKind),
    /// Operator cleared a fault.
    FaultCleared,
}

impl TransitionCause {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionCause::OpenRequested => "open_requested",
            TransitionCause::ActuatorConfirmed => "actuator_confirmed",
            TransitionCause::CrossingActivity => "crossing_activity",
            TransitionCause::Crossed => "crossed",
            TransitionCause::Abandoned => "abandoned",
            TransitionCause::StallHoldExpired => "stall_hold_expired",
            TransitionCause::Fault(kind) => kind.as_str(),
            TransitionCause::FaultCleared => "fault_cleared",
        }
    }
}

/// One recorded door transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorTransition {
    pub from: DoorState,
    pub to: DoorState,
    pub cause: TransitionCause,
    pub at: Instant,
}

/// Door controller for one door.
#[derive(Debug, Clone)]
pub struct DoorController {
    state: DoorState,
    entered_at: Instant,
    config: DoorConfig,
    history: VecDeque<DoorTransition>,
    pending: Option<DoorCommand>,
    deadline: Option<Instant>,
    fault: Option<HardwareFaultKind>,
    stall_hold_active: bool,
}

impl DoorController {
    /// Closed door with default timing.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> DoorControllerBuilder {
        DoorControllerBuilder::default()
    }

    pub fn state(&self) -> DoorState {
        self.state
    }

    pub fn config(&self) -> &DoorConfig {
        &self.config
    }

    /// Fault kind while in `Fault`.
    pub fn fault(&self) -> Option<HardwareFaultKind> {
        self.fault
    }

    pub fn entered_at(&self) -> Instant {
        self.entered_at
    }

    /// Deadline of the current state, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> &VecDeque<DoorTransition> {
        &self.history
    }

    pub fn last_transitions(&self, count: usize) -> Vec<DoorTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).copied().collect()
    }

    /// Queue an open command.
    ///
    /// # Errors
    ///
    /// - `Error::HardwareFault` while the door is in `Fault`
    /// - `Error::DoorBusy` while another cycle is in progress
    pub fn request_open(&mut self, now: Instant) -> Result<DoorTransition> {
        match self.state {
            DoorState::Closed => {}
            DoorState::Fault => {
                let kind = self.fault.unwrap_or(HardwareFaultKind::ActuatorFailure);
                return Err(Error::hardware_fault(kind));
            }
            state => return Err(Error::DoorBusy { state }),
        }

        let transition = self.transition_to(DoorState::Opening, TransitionCause::OpenRequested, now)?;
        self.pending = Some(DoorCommand::Open);
        self.deadline = Some(now + self.config.actuator_timeout);
        Ok(transition)
    }

    /// Take the queued actuator command, if any.
    pub fn take_command(&mut self) -> Option<DoorCommand> {
        self.pending.take()
    }

    /// Actuator confirmed the door is open.
    ///
    /// Stale confirmations (not in `Opening`) are ignored.
    pub fn confirm_open(&mut self, now: Instant) -> Result<Option<DoorTransition>> {
        if self.state != DoorState::Opening {
            debug!(state = %self.state, "Ignoring open confirmation");
            return Ok(None);
        }

        let transition = self.transition_to(DoorState::Open, TransitionCause::ActuatorConfirmed, now)?;
        self.deadline = Some(now + self.config.max_open_wait);
        Ok(Some(transition))
    }

    /// Actuator confirmed the door is closed.
    pub fn confirm_closed(&mut self, now: Instant) -> Result<Option<DoorTransition>> {
        if self.state != DoorState::Closing {
            debug!(state = %self.state, "Ignoring close confirmation");
            return Ok(None);
        }

        let transition = self.transition_to(DoorState::Closed, TransitionCause::ActuatorConfirmed, now)?;
        self.deadline = None;
        Ok(Some(transition))
    }

    /// Someone entered the gap.
    pub fn begin_crossing(&mut self, now: Instant) -> Result<DoorTransition> {
        // Open-wait deadline carries over.
        self.transition_to(DoorState::Crossing, TransitionCause::CrossingActivity, now)
    }

    /// The gap cleared without a crossing.
    pub fn crossing_cleared(&mut self, now: Instant) -> Result<DoorTransition> {
        self.transition_to(DoorState::Open, TransitionCause::CrossingActivity, now)
    }

    /// Start closing and queue the close command.
    pub fn begin_close(&mut self, cause: TransitionCause, now: Instant) -> Result<DoorTransition> {
        let transition = self.transition_to(DoorState::Closing, cause, now)?;
        self.pending = Some(DoorCommand::Close);
        self.deadline = Some(now + self.config.actuator_timeout);
        self.stall_hold_active = false;
        Ok(transition)
    }

    /// Hold the door open for `stall_hold` from `now`, replacing the
    /// open-wait deadline.
    pub fn hold_for_stall(&mut self, now: Instant) {
        if self.state.is_passable() {
            self.deadline = Some(now + self.config.stall_hold);
            self.stall_hold_active = true;
            info!(hold_secs = self.config.stall_hold.as_secs(), "Crossing stalled, holding door open");
        }
    }

    /// Move to `Fault`. Returns `None` if already faulted.
    pub fn enter_fault(&mut self, kind: HardwareFaultKind, now: Instant) -> Option<DoorTransition> {
        if self.state == DoorState::Fault {
            return None;
        }

        let transition = self
            .transition_to(DoorState::Fault, TransitionCause::Fault(kind), now)
            .ok()?;
        self.fault = Some(kind);
        self.pending = None;
        self.deadline = None;
        self.stall_hold_active = false;
        warn!(kind = %kind, from = %transition.from, "Door entered FAULT");
        Some(transition)
    }

    /// Administrative fault clear. Queues a close command to resynchronise
    /// the actuator.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the door is not in `Fault`.
    pub fn clear_fault(&mut self, now: Instant) -> Result<DoorTransition> {
        let transition = self.transition_to(DoorState::Closed, TransitionCause::FaultCleared, now)?;
        self.fault = None;
        self.pending = Some(DoorCommand::Close);
        info!("Door fault cleared");
        Ok(transition)
    }

    /// Apply the current state's deadline at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<DoorTransition> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        match self.state {
            DoorState::Opening | DoorState::Closing => {
                self.enter_fault(HardwareFaultKind::ActuatorTimeout, now)
            }
            DoorState::Open | DoorState::Crossing => {
                let cause = if self.stall_hold_active {
                    TransitionCause::StallHoldExpired
                } else {
                    TransitionCause::Abandoned
                };
                info!(cause = cause.as_str(), "Closing door without crossing");
                self.begin_close(cause, now).ok()
            }
            DoorState::Closed | DoorState::Fault => {
                self.deadline = None;
                None
            }
        }
    }

    /// Validate and apply a transition.
    fn transition_to(
        &mut self,
        to: DoorState,
        cause: TransitionCause,
        now: Instant,
    ) -> Result<DoorTransition> {
        if !self.state.can_transition_to(&to) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        let transition = DoorTransition {
            from: self.state,
            to,
            cause,
            at: now,
        };

        self.state = to;
        self.entered_at = now;
        self.history.push_back(transition);
        if self.history.len() > DOOR_HISTORY_SIZE {
            self.history.pop_front();
        }

        debug!(from = %transition.from, to = %to, cause = cause.as_str(), "Door transition");
        Ok(transition)
    }
}

impl Default for DoorController {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`DoorController`].
///
/// Restoring a non-`Closed` initial state is meant for tests and recovery;
/// no deadline is armed for it.
#[derive(Debug, Default)]
pub struct DoorControllerBuilder {
    initial_state: Option<DoorState>,
    config: Option<DoorConfig>,
    fault: Option<HardwareFaultKind>,
}

impl DoorControllerBuilder {
    pub fn with_initial_state(mut self, state: DoorState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_config(mut self, config: DoorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Start in `Fault` with `kind`.
    pub fn with_fault(mut self, kind: HardwareFaultKind) -> Self {
        self.initial_state = Some(DoorState::Fault);
        self.fault = Some(kind);
        self
    }

    pub fn build(self) -> DoorController {
        let state = self.initial_state.unwrap_or(DoorState::Closed);
        let fault = match state {
            DoorState::Fault => Some(self.fault.unwrap_or(HardwareFaultKind::ActuatorFailure)),
            _ => None,
        };

        DoorController {
            state,
            entered_at: Instant::now(),
            config: self.config.unwrap_or_default(),
            history: VecDeque::with_capacity(DOOR_HISTORY_SIZE),
            pending: None,
            deadline: None,
            fault,
            stall_hold_active: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn open_door(now: Instant) -> DoorController {
        let mut door = DoorController::new();
        door.request_open(now).unwrap();
        door.take_command();
        door.confirm_open(now).unwrap();
        door
    }

    #[test]
    fn test_full_cycle() {
        let t0 = Instant::now();
        let mut door = open_door(t0);
        assert_eq!(door.state(), DoorState::Open);

        door.begin_crossing(t0).unwrap();
        door.begin_close(TransitionCause::Crossed, t0).unwrap();
        assert_eq!(door.take_command(), Some(DoorCommand::Close));
        door.confirm_closed(t0).unwrap();

        let states: Vec<_> = door.history().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                DoorState::Opening,
                DoorState::Open,
                DoorState::Crossing,
                DoorState::Closing,
                DoorState::Closed
            ]
        );
    }

    #[rstest]
    #[case(DoorState::Opening)]
    #[case(DoorState::Open)]
    #[case(DoorState::Crossing)]
    #[case(DoorState::Closing)]
    fn test_request_open_busy(#[case] state: DoorState) {
        let mut door = DoorController::builder().with_initial_state(state).build();
        let result = door.request_open(Instant::now());
        assert!(matches!(result, Err(Error::DoorBusy { state: s }) if s == state));
        assert_eq!(door.take_command(), None);
    }

    #[test]
    fn test_request_open_while_fault() {
        let mut door = DoorController::builder()
            .with_fault(HardwareFaultKind::SensorDropout)
            .build();

        let result = door.request_open(Instant::now());
        assert!(matches!(
            result,
            Err(Error::HardwareFault {
                kind: HardwareFaultKind::SensorDropout
            })
        ));
        assert_eq!(door.state(), DoorState::Fault);
    }

    #[test]
    fn test_actuator_timeout_faults() {
        let t0 = Instant::now();
        let mut door = DoorController::new();
        door.request_open(t0).unwrap();

        assert!(door.tick(t0 + Duration::from_millis(1_999)).is_none());
        let transition = door.tick(t0 + Duration::from_millis(2_000)).unwrap();
        assert_eq!(transition.to, DoorState::Fault);
        assert_eq!(door.fault(), Some(HardwareFaultKind::ActuatorTimeout));
        assert_eq!(door.take_command(), None);
    }

    #[test]
    fn test_open_wait_closes_abandoned() {
        let t0 = Instant::now();
        let mut door = open_door(t0);

        assert!(door.tick(t0 + Duration::from_secs(14)).is_none());
        let transition = door.tick(t0 + Duration::from_secs(15)).unwrap();
        assert_eq!(transition.to, DoorState::Closing);
        assert_eq!(transition.cause, TransitionCause::Abandoned);
        assert_eq!(door.take_command(), Some(DoorCommand::Close));
    }

    #[test]
    fn test_stall_hold_replaces_open_wait() {
        let t0 = Instant::now();
        let mut door = open_door(t0);
        door.begin_crossing(t0).unwrap();

        door.hold_for_stall(t0 + Duration::from_secs(12));
        assert!(door.tick(t0 + Duration::from_secs(15)).is_none());

        let transition = door.tick(t0 + Duration::from_secs(22)).unwrap();
        assert_eq!(transition.from, DoorState::Crossing);
        assert_eq!(transition.cause, TransitionCause::StallHoldExpired);
    }

    #[test]
    fn test_fault_only_cleared_by_operator() {
        let t0 = Instant::now();
        let mut door = open_door(t0);

        door.enter_fault(HardwareFaultKind::ActuatorFailure, t0).unwrap();
        assert!(door.enter_fault(HardwareFaultKind::SensorDropout, t0).is_none());
        assert_eq!(door.fault(), Some(HardwareFaultKind::ActuatorFailure));

        assert!(door.confirm_closed(t0).unwrap().is_none());
        assert_eq!(door.state(), DoorState::Fault);

        door.clear_fault(t0).unwrap();
        assert_eq!(door.state(), DoorState::Closed);
        assert_eq!(door.fault(), None);
        assert_eq!(door.take_command(), Some(DoorCommand::Close));

        assert!(matches!(
            door.clear_fault(t0),
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_stale_confirmations_ignored() {
        let t0 = Instant::now();
        let mut door = DoorController::new();
        assert!(door.confirm_open(t0).unwrap().is_none());
        assert!(door.confirm_closed(t0).unwrap().is_none());
        assert!(door.history().is_empty());
    }

    #[test]
    fn test_invalid_transition() {
        let mut door = DoorController::new();
        let result = door.begin_crossing(Instant::now());
        assert!(matches!(result, Err(Error::InvalidStateTransition { .. })));
    }

    #[test]
    fn test_history_bounded() {
        let t0 = Instant::now();
        let mut door = DoorController::new();
        for _ in 0..30 {
            door.request_open(t0).unwrap();
            door.confirm_open(t0).unwrap();
            door.begin_close(TransitionCause::Abandoned, t0).unwrap();
            door.confirm_closed(t0).unwrap();
        }

        assert_eq!(door.history().len(), DOOR_HISTORY_SIZE);
        assert_eq!(door.last_transitions(2).len(), 2);
        assert_eq!(door.last_transitions(2)[1].to, DoorState::Closed);
    }
}
