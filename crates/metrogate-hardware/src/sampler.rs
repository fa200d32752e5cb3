//! Level-to-edge conversion for the beam pair.

use metrogate_core::SensorId;
use std::time::Instant;

use crate::types::{BeamLevels, BeamSample};

/// Turns periodic level readings into [`BeamSample`] edges.
///
/// Only changes are reported. When both beams change in the same tick the
/// occlusion edges are emitted before the clear edges, so a fast body that
/// moved from A to B between two reads is still seen as "both occluded" for
/// an instant.
#[derive(Debug, Clone, Default)]
pub struct BeamSampler {
    last: BeamLevels,
}

impl BeamSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known reading (no edges for the initial state).
    pub fn with_levels(levels: BeamLevels) -> Self {
        Self { last: levels }
    }

    /// Last levels seen.
    pub fn levels(&self) -> BeamLevels {
        self.last
    }

    /// Compare `levels` with the previous reading and return the edges.
    pub fn update(&mut self, levels: BeamLevels, at: Instant) -> Vec<BeamSample> {
        let mut samples = Vec::with_capacity(2);

        for occluded in [true, false] {
            for sensor in [SensorId::A, SensorId::B] {
                let now = levels.is_occluded(sensor);
                if now == occluded && now != self.last.is_occluded(sensor) {
                    samples.push(BeamSample::new(sensor, now, at));
                }
            }
        }

        self.last = levels;
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_edges_when_unchanged() {
        let mut sampler = BeamSampler::new();
        assert!(sampler.update(BeamLevels::CLEAR, Instant::now()).is_empty());
    }

    #[test]
    fn test_single_edge() {
        let mut sampler = BeamSampler::new();
        let now = Instant::now();
        let samples = sampler.update(BeamLevels::new(true, false), now);
        assert_eq!(samples, vec![BeamSample::occluded(SensorId::A, now)]);

        let samples = sampler.update(BeamLevels::CLEAR, now);
        assert_eq!(samples, vec![BeamSample::cleared(SensorId::A, now)]);
    }

    #[test]
    fn test_occlusion_reported_before_clear() {
        let mut sampler = BeamSampler::with_levels(BeamLevels::new(true, false));
        let now = Instant::now();
        let samples = sampler.update(BeamLevels::new(false, true), now);
        assert_eq!(
            samples,
            vec![
                BeamSample::occluded(SensorId::B, now),
                BeamSample::cleared(SensorId::A, now),
            ]
        );
        assert_eq!(sampler.levels(), BeamLevels::new(false, true));
    }
}
