//! Mock beam sensor pair for testing and simulated deployments.
//!
//! The mock exposes the same level-reading interface as a real GPIO pair; a
//! [`MockBeamSensorHandle`] drives the levels the way a passenger would.

use crate::{
    HardwareError, Result,
    traits::BeamSensor,
    types::{BeamLevels, DeviceInfo},
};
use metrogate_core::SensorId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Mock beam sensor pair.
///
/// # Examples
///
/// ```
/// use metrogate_core::SensorId;
/// use metrogate_hardware::mock::MockBeamSensor;
/// use metrogate_hardware::traits::BeamSensor;
///
/// #[tokio::main]
/// async fn main() -> metrogate_hardware::Result<()> {
///     let (mut sensor, handle) = MockBeamSensor::new();
///
///     handle.occlude(SensorId::A);
///     let levels = sensor.read_levels().await?;
///     assert!(levels.a_occluded);
///     assert!(!levels.b_occluded);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockBeamSensor {
    levels_rx: watch::Receiver<BeamLevels>,
    failing: Arc<AtomicBool>,
    name: String,
}

impl MockBeamSensor {
    /// Create a new mock sensor pair with both beams clear.
    ///
    /// Returns a tuple of (MockBeamSensor, MockBeamSensorHandle) where the
    /// handle drives the beam levels.
    pub fn new() -> (Self, MockBeamSensorHandle) {
        Self::with_name("Mock Beam Pair".to_string())
    }

    /// Create a new mock sensor pair with a custom name.
    pub fn with_name(name: String) -> (Self, MockBeamSensorHandle) {
        let (levels_tx, levels_rx) = watch::channel(BeamLevels::CLEAR);
        let failing = Arc::new(AtomicBool::new(false));

        let sensor = Self {
            levels_rx,
            failing: failing.clone(),
            name,
        };

        let handle = MockBeamSensorHandle { levels_tx, failing };

        (sensor, handle)
    }
}

impl BeamSensor for MockBeamSensor {
    async fn read_levels(&mut self) -> Result<BeamLevels> {
        if self.failing.load(Ordering::Acquire) {
            return Err(HardwareError::sensor_unavailable(self.name.clone()));
        }
        Ok(*self.levels_rx.borrow_and_update())
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "mock-beam-pair"))
    }
}

/// Handle for driving a mock beam sensor pair.
#[derive(Debug, Clone)]
pub struct MockBeamSensorHandle {
    levels_tx: watch::Sender<BeamLevels>,
    failing: Arc<AtomicBool>,
}

impl MockBeamSensorHandle {
    /// Interrupt one beam.
    pub fn occlude(&self, sensor: SensorId) {
        self.set(sensor, true);
    }

    /// Restore one beam.
    pub fn clear(&self, sensor: SensorId) {
        self.set(sensor, false);
    }

    /// Set one beam level.
    pub fn set(&self, sensor: SensorId, occluded: bool) {
        self.levels_tx
            .send_modify(|levels| *levels = levels.with(sensor, occluded));
    }

    /// Replace both levels at once.
    pub fn set_levels(&self, levels: BeamLevels) {
        self.levels_tx.send_replace(levels);
    }

    /// Current simulated levels.
    pub fn levels(&self) -> BeamLevels {
        *self.levels_tx.borrow()
    }

    /// Make every read fail until reset, simulating a wiring dropout.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_levels_follow_handle() {
        let (mut sensor, handle) = MockBeamSensor::new();
        assert_eq!(sensor.read_levels().await.unwrap(), BeamLevels::CLEAR);

        handle.occlude(SensorId::A);
        handle.occlude(SensorId::B);
        assert_eq!(
            sensor.read_levels().await.unwrap(),
            BeamLevels::new(true, true)
        );

        handle.clear(SensorId::A);
        assert_eq!(handle.levels(), BeamLevels::new(false, true));
        assert_eq!(
            sensor.read_levels().await.unwrap(),
            BeamLevels::new(false, true)
        );
    }

    #[tokio::test]
    async fn test_failing_sensor() {
        let (mut sensor, handle) = MockBeamSensor::new();
        handle.set_failing(true);
        let result = sensor.read_levels().await;
        assert!(matches!(result, Err(HardwareError::SensorUnavailable { .. })));

        handle.set_failing(false);
        assert!(sensor.read_levels().await.is_ok());
    }

    #[tokio::test]
    async fn test_get_info() {
        let (sensor, _handle) = MockBeamSensor::with_name("Lobby".to_string());
        let info = sensor.get_info().await.unwrap();
        assert_eq!(info.name, "Lobby");
    }
}
