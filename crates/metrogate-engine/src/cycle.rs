//! Door and crossing detector under one lock.
//!
//! A door cycle starts when an open request is accepted and ends when the
//! door is confirmed closed again (or faults). The detector is armed while
//! the door is confirmed open and disarmed as soon as it starts closing, so
//! each cycle yields at most one valid crossing.

use metrogate_core::{CredentialId, DoorState, HardwareFaultKind, Result};
use metrogate_hardware::{BeamLevels, BeamSample, DoorCommand};
use metrogate_telemetry::measurements::DoorStatus;
use std::time::Instant;
use tracing::{debug, info};

use crate::crossing::{CrossingConfig, CrossingDetector, CrossingEvent};
use crate::door::{DoorConfig, DoorController, DoorTransition, TransitionCause};

/// End of a door cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEnd {
    /// Credential the cycle was opened for.
    pub credential: Option<CredentialId>,
    /// A valid crossing happened.
    pub crossed: bool,
}

/// Everything one call changed.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub transitions: Vec<DoorTransition>,
    pub crossing: Option<CrossingEvent>,
    pub cycle_ended: Option<CycleEnd>,
}

impl CycleOutcome {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.crossing.is_none() && self.cycle_ended.is_none()
    }

    /// The valid crossing reported by this call, if any.
    pub fn valid_crossing(&self) -> Option<&CrossingEvent> {
        self.crossing.as_ref().filter(|event| event.valid)
    }
}

/// One door with its crossing detector.
#[derive(Debug, Clone)]
pub struct DoorCycle {
    door: DoorController,
    detector: CrossingDetector,
    granted_to: Option<CredentialId>,
    crossed: bool,
}

impl DoorCycle {
    pub fn new(door: DoorConfig, crossing: CrossingConfig) -> Self {
        Self::from_parts(
            DoorController::builder().with_config(door).build(),
            CrossingDetector::new(crossing),
        )
    }

    pub fn from_parts(door: DoorController, detector: CrossingDetector) -> Self {
        Self {
            door,
            detector,
            granted_to: None,
            crossed: false,
        }
    }

    pub fn door(&self) -> &DoorController {
        &self.door
    }

    pub fn detector(&self) -> &CrossingDetector {
        &self.detector
    }

    pub fn state(&self) -> DoorState {
        self.door.state()
    }

    pub fn levels(&self) -> BeamLevels {
        self.detector.levels()
    }

    /// Credential of the cycle in progress.
    pub fn granted_to(&self) -> Option<&CredentialId> {
        self.granted_to.as_ref()
    }

    pub fn status(&self) -> DoorStatus {
        let levels = self.detector.levels();
        DoorStatus {
            state: self.door.state(),
            detecting_crossing: self.detector.is_detecting(),
            crossing_stalled: self.detector.is_stalled(),
            laser_a_active: !levels.a_occluded,
            laser_b_active: !levels.b_occluded,
        }
    }

    /// Start a cycle for `credential`.
    ///
    /// # Errors
    ///
    /// `Error::HardwareFault` in `FAULT`, `Error::DoorBusy` during another
    /// cycle. The cycle is untouched on error.
    pub fn request_open(&mut self, credential: Option<CredentialId>, now: Instant) -> Result<DoorTransition> {
        let transition = self.door.request_open(now)?;
        self.granted_to = credential;
        self.crossed = false;
        Ok(transition)
    }

    pub fn take_command(&mut self) -> Option<DoorCommand> {
        self.door.take_command()
    }

    /// Feed one beam edge.
    pub fn observe(&mut self, sample: BeamSample) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        if let Some(event) = self.detector.observe(sample) {
            self.on_crossing(event, sample.at, &mut outcome);
        }
        self.reconcile(sample.at, &mut outcome);
        outcome
    }

    /// Apply detector and door timers.
    pub fn tick(&mut self, now: Instant) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        if let Some(event) = self.detector.poll(now) {
            self.on_crossing(event, now, &mut outcome);
        }

        if let Some(transition) = self.door.tick(now) {
            self.after_transition(transition, &mut outcome);
        }
        self.reconcile(now, &mut outcome);
        outcome
    }

    /// Actuator confirmation.
    pub fn confirm(&mut self, command: DoorCommand, now: Instant) -> Result<CycleOutcome> {
        let mut outcome = CycleOutcome::default();
        let transition = match command {
            DoorCommand::Open => self.door.confirm_open(now)?,
            DoorCommand::Close => self.door.confirm_closed(now)?,
        };

        if let Some(transition) = transition {
            self.after_transition(transition, &mut outcome);
            match transition.to {
                DoorState::Open => self.detector.arm(now),
                DoorState::Closed => self.end_cycle(&mut outcome),
                _ => {}
            }
        }

        // Someone may already be in the gap when the door finishes opening.
        self.reconcile(now, &mut outcome);
        Ok(outcome)
    }

    /// Hardware failure reported by the sensor loop.
    pub fn fault(&mut self, kind: HardwareFaultKind, now: Instant) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        if let Some(transition) = self.door.enter_fault(kind, now) {
            self.after_transition(transition, &mut outcome);
        }
        outcome
    }

    /// Administrative fault clear.
    ///
    /// # Errors
    ///
    /// `Error::InvalidStateTransition` when the door is not in `FAULT`.
    pub fn clear_fault(&mut self, now: Instant) -> Result<CycleOutcome> {
        let transition = self.door.clear_fault(now)?;
        let mut outcome = CycleOutcome::default();
        outcome.transitions.push(transition);
        Ok(outcome)
    }

    fn on_crossing(&mut self, event: CrossingEvent, now: Instant, outcome: &mut CycleOutcome) {
        outcome.crossing = Some(event);

        if event.valid {
            self.crossed = true;
            info!(
                direction = %event.direction,
                duration_ms = event.duration().as_millis() as u64,
                "Valid crossing"
            );
            if self.door.state().is_passable()
                && let Ok(transition) = self.door.begin_close(TransitionCause::Crossed, now)
            {
                self.after_transition(transition, outcome);
            }
        } else if event.is_ambiguous() {
            self.door.hold_for_stall(now);
        } else {
            debug!(direction = %event.direction, "Crossing aborted");
        }
    }

    /// Keep `OPEN`/`CROSSING` in line with detector activity.
    fn reconcile(&mut self, now: Instant, outcome: &mut CycleOutcome) {
        let detecting = self.detector.is_detecting();
        let transition = match self.door.state() {
            DoorState::Open if detecting => self.door.begin_crossing(now).ok(),
            DoorState::Crossing if !detecting => self.door.crossing_cleared(now).ok(),
            _ => None,
        };

        if let Some(transition) = transition {
            outcome.transitions.push(transition);
        }
    }

    fn after_transition(&mut self, transition: DoorTransition, outcome: &mut CycleOutcome) {
        outcome.transitions.push(transition);
        match transition.to {
            DoorState::Closing => self.detector.disarm(),
            DoorState::Fault => {
                self.detector.disarm();
                self.end_cycle(outcome);
            }
            _ => {}
        }
    }

    fn end_cycle(&mut self, outcome: &mut CycleOutcome) {
        let credential = self.granted_to.take();
        let crossed = std::mem::take(&mut self.crossed);
        self.detector.disarm();
        debug!(crossed, "Door cycle ended");
        outcome.cycle_ended = Some(CycleEnd { credential, crossed });
    }
}

impl Default for DoorCycle {
    fn default() -> Self {
        Self::new(DoorConfig::default(), CrossingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrogate_core::{CrossingDirection, Error, SensorId};
    use std::time::Duration;

    fn ms(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    fn open_cycle(t0: Instant) -> DoorCycle {
        let mut cycle = DoorCycle::default();
        cycle
            .request_open(Some(CredentialId::new("card-42").unwrap()), t0)
            .unwrap();
        assert_eq!(cycle.take_command(), Some(DoorCommand::Open));
        cycle.confirm(DoorCommand::Open, t0).unwrap();
        cycle
    }

    #[test]
    fn test_inbound_crossing_closes_door() {
        let t0 = Instant::now();
        let mut cycle = open_cycle(t0);

        let outcome = cycle.observe(BeamSample::occluded(SensorId::A, ms(t0, 100)));
        assert_eq!(outcome.transitions[0].to, DoorState::Crossing);
        assert!(cycle.status().detecting_crossing);
        assert!(!cycle.status().laser_a_active);

        cycle.observe(BeamSample::occluded(SensorId::B, ms(t0, 300)));
        cycle.observe(BeamSample::cleared(SensorId::A, ms(t0, 500)));
        let outcome = cycle.observe(BeamSample::cleared(SensorId::B, ms(t0, 700)));

        let event = outcome.valid_crossing().unwrap();
        assert_eq!(event.direction, CrossingDirection::Inbound);
        assert_eq!(cycle.state(), DoorState::Closing);
        assert_eq!(cycle.take_command(), Some(DoorCommand::Close));

        let outcome = cycle.confirm(DoorCommand::Close, ms(t0, 900)).unwrap();
        let end = outcome.cycle_ended.unwrap();
        assert!(end.crossed);
        assert_eq!(end.credential.unwrap().as_str(), "card-42");
        assert!(cycle.granted_to().is_none());
    }

    #[test]
    fn test_partial_trigger_returns_to_open() {
        let t0 = Instant::now();
        let mut cycle = open_cycle(t0);

        cycle.observe(BeamSample::occluded(SensorId::B, ms(t0, 100)));
        assert_eq!(cycle.state(), DoorState::Crossing);

        let outcome = cycle.observe(BeamSample::cleared(SensorId::B, ms(t0, 200)));
        assert!(outcome.crossing.is_none());
        assert_eq!(cycle.state(), DoorState::Open);
    }

    #[test]
    fn test_stalled_crossing_holds_then_closes() {
        let t0 = Instant::now();
        let mut cycle = open_cycle(t0);

        cycle.observe(BeamSample::occluded(SensorId::A, ms(t0, 0)));
        cycle.observe(BeamSample::occluded(SensorId::B, ms(t0, 200)));

        let outcome = cycle.tick(ms(t0, 3_100));
        assert!(outcome.crossing.unwrap().is_ambiguous());
        assert!(cycle.status().crossing_stalled);
        assert_eq!(cycle.state(), DoorState::Crossing);

        // Open-wait would have expired at 15s; the stall hold runs to 13.1s.
        assert!(cycle.tick(ms(t0, 13_000)).transitions.is_empty());
        let outcome = cycle.tick(ms(t0, 13_100));
        assert_eq!(outcome.transitions[0].to, DoorState::Closing);
        assert!(!cycle.detector().is_armed());

        let outcome = cycle.confirm(DoorCommand::Close, ms(t0, 13_500)).unwrap();
        assert!(!outcome.cycle_ended.unwrap().crossed);
    }

    #[test]
    fn test_abandoned_cycle() {
        let t0 = Instant::now();
        let mut cycle = open_cycle(t0);

        let outcome = cycle.tick(ms(t0, 15_000));
        assert_eq!(outcome.transitions[0].cause, TransitionCause::Abandoned);

        let outcome = cycle.confirm(DoorCommand::Close, ms(t0, 15_200)).unwrap();
        assert!(!outcome.cycle_ended.unwrap().crossed);
    }

    #[test]
    fn test_fault_ends_cycle_and_rejects_open() {
        let t0 = Instant::now();
        let mut cycle = open_cycle(t0);

        let outcome = cycle.fault(HardwareFaultKind::SensorDropout, t0);
        assert!(outcome.cycle_ended.is_some());
        assert!(matches!(
            cycle.request_open(None, t0),
            Err(Error::HardwareFault { .. })
        ));

        cycle.clear_fault(t0).unwrap();
        assert_eq!(cycle.take_command(), Some(DoorCommand::Close));
        cycle.request_open(None, t0).unwrap();
    }

    #[test]
    fn test_samples_tracked_while_closed() {
        let t0 = Instant::now();
        let mut cycle = DoorCycle::default();

        let outcome = cycle.observe(BeamSample::occluded(SensorId::A, t0));
        assert!(outcome.is_empty());
        assert!(cycle.levels().a_occluded);
        assert!(!cycle.status().detecting_crossing);
    }
}
