//! Two-beam crossing detector.
//!
//! Beam A sits on the unpaid side of the door, beam B on the paid side. A
//! person walking through interrupts A, then both, then only B, then neither.
//! The detector turns the resulting edge sequence into at most one valid
//! [`CrossingEvent`] per door cycle.
//!
//! # States
//!
//! ```text
//!            occlude X                occlude other          clear one
//!   IDLE ───────────────► X_OCCLUDED ───────────────► BOTH ─────────────► COMPLETING
//!    ▲                        │                        ▲                     │
//!    │   clear X / partial    │                        │   re-occlude        │
//!    ├────────────────────────┘                        └─────────────────────┤
//!    │                                  clear last (event)                   │
//!    └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - Direction is fixed by the first sensor occluded (A first is inbound).
//! - The crossing is valid only if the last sensor to clear is the opposite
//!   one; a body that steps in and backs out yields an invalid event.
//! - Occlusion lasting past `dwell_window` yields one ambiguous event, then
//!   the detector ignores everything until both beams are clear.
//! - A single beam that toggles, or stays occluded past `partial_timeout`
//!   without its pair, is forgotten silently. If it is still held when the
//!   other beam trips, the sequence resumes from BOTH with the held beam as
//!   the first one and the dwell window starting at the second occlusion.
//!
//! All timing uses the sample timestamps and the `now` passed to
//! [`poll`](CrossingDetector::poll), never the wall clock.
//!
//! # Examples
//!
//! ```
//! use metrogate_core::{CrossingDirection, SensorId};
//! use metrogate_engine::crossing::{CrossingConfig, CrossingDetector};
//! use metrogate_hardware::BeamSample;
//! use std::time::{Duration, Instant};
//!
//! let mut detector = CrossingDetector::new(CrossingConfig::default());
//! let t0 = Instant::now();
//! let at = |ms| t0 + Duration::from_millis(ms);
//! detector.arm(t0);
//!
//! assert!(detector.observe(BeamSample::occluded(SensorId::A, at(0))).is_none());
//! assert!(detector.observe(BeamSample::occluded(SensorId::B, at(200))).is_none());
//! assert!(detector.observe(BeamSample::cleared(SensorId::A, at(400))).is_none());
//!
//! let event = detector.observe(BeamSample::cleared(SensorId::B, at(600))).unwrap();
//! assert!(event.valid);
//! assert_eq!(event.direction, CrossingDirection::Inbound);
//! ```

use metrogate_core::constants::{DEFAULT_DWELL_WINDOW_MS, DEFAULT_PARTIAL_TIMEOUT_MS};
use metrogate_core::{CrossingDirection, SensorId};
use metrogate_hardware::{BeamLevels, BeamSample};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Detector timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingConfig {
    /// Maximum time from the first occlusion until both beams clear.
    pub dwell_window: Duration,
    /// How long one occluded beam waits for the other.
    pub partial_timeout: Duration,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            dwell_window: Duration::from_millis(DEFAULT_DWELL_WINDOW_MS),
            partial_timeout: Duration::from_millis(DEFAULT_PARTIAL_TIMEOUT_MS),
        }
    }
}

/// Detector phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossingPhase {
    Idle,
    AOccluded,
    BOccluded,
    BothOccluded,
    /// Both were occluded, one has cleared.
    Completing,
}

impl CrossingPhase {
    fn single(sensor: SensorId) -> Self {
        match sensor {
            SensorId::A => CrossingPhase::AOccluded,
            SensorId::B => CrossingPhase::BOccluded,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CrossingPhase::Idle => "IDLE",
            CrossingPhase::AOccluded => "A_OCCLUDED",
            CrossingPhase::BOccluded => "B_OCCLUDED",
            CrossingPhase::BothOccluded => "BOTH_OCCLUDED",
            CrossingPhase::Completing => "COMPLETING",
        }
    }
}

impl fmt::Display for CrossingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one occlusion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    pub start: Instant,
    pub end: Instant,
    pub direction: CrossingDirection,
    /// `true` only for a complete pass in one direction within the window.
    pub valid: bool,
}

impl CrossingEvent {
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    /// Stalled in the gap past the dwell window.
    pub fn is_ambiguous(&self) -> bool {
        self.direction == CrossingDirection::Ambiguous
    }
}

/// Crossing detector for one door.
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    config: CrossingConfig,
    phase: CrossingPhase,
    levels: BeamLevels,
    armed: bool,
    /// A valid crossing already happened in this cycle.
    completed: bool,
    /// An ambiguous event was emitted; waiting for both beams to clear.
    stalled: bool,
    /// Armed while the gap was occupied; waiting for both beams to clear.
    waiting_for_clear: bool,
    first: Option<SensorId>,
    started_at: Option<Instant>,
}

impl CrossingDetector {
    /// Create a disarmed detector with both beams clear.
    pub fn new(config: CrossingConfig) -> Self {
        Self {
            config,
            phase: CrossingPhase::Idle,
            levels: BeamLevels::CLEAR,
            armed: false,
            completed: false,
            stalled: false,
            waiting_for_clear: false,
            first: None,
            started_at: None,
        }
    }

    pub fn config(&self) -> &CrossingConfig {
        &self.config
    }

    pub fn phase(&self) -> CrossingPhase {
        self.phase
    }

    /// Last known beam levels, tracked even while disarmed.
    pub fn levels(&self) -> BeamLevels {
        self.levels
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// A sequence is in progress (or stalled) in the current cycle.
    pub fn is_detecting(&self) -> bool {
        self.armed && (self.phase != CrossingPhase::Idle || self.stalled)
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// A valid crossing was already reported for this cycle.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Start a new door cycle.
    ///
    /// If someone is already standing in the gap, nothing is tracked until
    /// both beams have cleared.
    pub fn arm(&mut self, now: Instant) {
        self.reset_sequence();
        self.armed = true;
        self.completed = false;
        self.stalled = false;
        self.waiting_for_clear = self.levels.any_occluded();
        if self.waiting_for_clear {
            debug!(?now, "Detector armed with occupied gap, waiting for clear");
        } else {
            trace!("Detector armed");
        }
    }

    /// End the door cycle. Levels keep being tracked.
    pub fn disarm(&mut self) {
        self.reset_sequence();
        self.armed = false;
        self.completed = false;
        self.stalled = false;
        self.waiting_for_clear = false;
        trace!("Detector disarmed");
    }

    /// Feed one beam edge.
    pub fn observe(&mut self, sample: BeamSample) -> Option<CrossingEvent> {
        if self.levels.is_occluded(sample.sensor) == sample.occluded {
            return None;
        }

        let expired = self.poll(sample.at);
        self.levels = self.levels.with(sample.sensor, sample.occluded);

        if !self.armed || self.completed {
            return expired;
        }

        if self.stalled || self.waiting_for_clear {
            if !self.levels.any_occluded() {
                trace!(stalled = self.stalled, "Gap clear, detector released");
                self.stalled = false;
                self.waiting_for_clear = false;
                self.reset_sequence();
            }
            return expired;
        }

        expired.or_else(|| self.step(sample))
    }

    /// Apply timeouts at `now`.
    ///
    /// Returns the ambiguous event when a sequence outlives the dwell window.
    pub fn poll(&mut self, now: Instant) -> Option<CrossingEvent> {
        if !self.armed || self.completed || self.stalled || self.waiting_for_clear {
            return None;
        }

        let start = self.started_at?;
        let elapsed = now.saturating_duration_since(start);

        match self.phase {
            CrossingPhase::Idle => None,
            CrossingPhase::AOccluded | CrossingPhase::BOccluded => {
                if elapsed > self.config.partial_timeout {
                    trace!(phase = %self.phase, "Partial trigger expired");
                    self.reset_sequence();
                }
                None
            }
            CrossingPhase::BothOccluded | CrossingPhase::Completing => {
                if elapsed <= self.config.dwell_window {
                    return None;
                }
                debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Crossing stalled past dwell window"
                );
                self.stalled = true;
                Some(CrossingEvent {
                    start,
                    end: now,
                    direction: CrossingDirection::Ambiguous,
                    valid: false,
                })
            }
        }
    }

    fn step(&mut self, sample: BeamSample) -> Option<CrossingEvent> {
        match (self.phase, sample.occluded) {
            (CrossingPhase::Idle, true) => {
                self.started_at = Some(sample.at);
                let other = sample.sensor.other();
                if self.levels.is_occluded(other) {
                    // The other beam outlived its partial timeout and is
                    // still held: the person hesitated, then stepped on.
                    self.first = Some(other);
                    self.phase = CrossingPhase::BothOccluded;
                } else {
                    self.first = Some(sample.sensor);
                    self.phase = CrossingPhase::single(sample.sensor);
                }
                None
            }
            (CrossingPhase::AOccluded | CrossingPhase::BOccluded, true) => {
                self.phase = CrossingPhase::BothOccluded;
                None
            }
            (CrossingPhase::AOccluded | CrossingPhase::BOccluded, false) => {
                trace!(sensor = %sample.sensor, "Single beam toggled, ignoring");
                self.reset_sequence();
                None
            }
            (CrossingPhase::BothOccluded, false) => {
                self.phase = CrossingPhase::Completing;
                None
            }
            (CrossingPhase::Completing, true) => {
                self.phase = CrossingPhase::BothOccluded;
                None
            }
            (CrossingPhase::Completing, false) => self.finish(sample.sensor, sample.at),
            // Level bookkeeping makes these unreachable; stay put.
            (CrossingPhase::Idle, false) | (CrossingPhase::BothOccluded, true) => None,
        }
    }

    fn finish(&mut self, last: SensorId, end: Instant) -> Option<CrossingEvent> {
        let first = self.first?;
        let start = self.started_at?;
        let valid = last == first.other();

        let event = CrossingEvent {
            start,
            end,
            direction: CrossingDirection::from_first_sensor(first),
            valid,
        };

        self.reset_sequence();
        if valid {
            self.completed = true;
            debug!(
                direction = %event.direction,
                duration_ms = event.duration().as_millis() as u64,
                "Valid crossing"
            );
        } else {
            debug!(first = %first, "Body backed out, crossing invalid");
        }

        Some(event)
    }

    fn reset_sequence(&mut self) {
        self.phase = CrossingPhase::Idle;
        self.first = None;
        self.started_at = None;
    }
}
