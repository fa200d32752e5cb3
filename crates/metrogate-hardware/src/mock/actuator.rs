//! Mock door actuator for testing and simulated deployments.
//!
//! By default every accepted command is confirmed on the next poll. Tests can
//! switch auto-confirmation off to simulate a jammed door, confirm commands
//! by hand, or make the actuator refuse commands.

use crate::{
    HardwareError, Result,
    traits::DoorActuator,
    types::{ActuatorPosition, DeviceInfo, DoorCommand},
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
struct ActuatorState {
    auto_confirm: bool,
    failing: bool,
    received: Vec<DoorCommand>,
    confirmations: VecDeque<DoorCommand>,
    position: ActuatorPosition,
}

/// Mock door actuator.
///
/// # Examples
///
/// ```
/// use metrogate_hardware::mock::MockActuator;
/// use metrogate_hardware::traits::DoorActuator;
/// use metrogate_hardware::types::DoorCommand;
///
/// #[tokio::main]
/// async fn main() -> metrogate_hardware::Result<()> {
///     let (mut actuator, handle) = MockActuator::new();
///
///     actuator.command(DoorCommand::Open).await?;
///     assert_eq!(actuator.poll_confirmation().await?, Some(DoorCommand::Open));
///     assert_eq!(handle.received(), vec![DoorCommand::Open]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockActuator {
    state: Arc<Mutex<ActuatorState>>,
    name: String,
}

impl MockActuator {
    /// Create a new auto-confirming mock actuator in the closed position.
    pub fn new() -> (Self, MockActuatorHandle) {
        Self::with_name("Mock Door Actuator".to_string())
    }

    /// Create a new mock actuator with a custom name.
    pub fn with_name(name: String) -> (Self, MockActuatorHandle) {
        let state = Arc::new(Mutex::new(ActuatorState {
            auto_confirm: true,
            failing: false,
            received: Vec::new(),
            confirmations: VecDeque::new(),
            position: ActuatorPosition::Closed,
        }));

        let actuator = Self {
            state: state.clone(),
            name,
        };

        (actuator, MockActuatorHandle { state })
    }
}

impl DoorActuator for MockActuator {
    async fn command(&mut self, command: DoorCommand) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(HardwareError::command_refused(
                self.name.clone(),
                command,
                "actuator offline",
            ));
        }

        state.received.push(command);
        if state.auto_confirm {
            state.confirmations.push_back(command);
        }
        Ok(())
    }

    async fn poll_confirmation(&mut self) -> Result<Option<DoorCommand>> {
        let mut state = self.state.lock();
        let confirmed = state.confirmations.pop_front();
        if let Some(command) = confirmed {
            state.position = command.into();
        }
        Ok(confirmed)
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "mock-actuator"))
    }
}

/// Handle for controlling a mock door actuator.
#[derive(Debug, Clone)]
pub struct MockActuatorHandle {
    state: Arc<Mutex<ActuatorState>>,
}

impl MockActuatorHandle {
    /// Enable or disable automatic confirmation of commands.
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.state.lock().auto_confirm = enabled;
    }

    /// Make the actuator refuse commands.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Queue a confirmation by hand (used with auto-confirm disabled).
    pub fn confirm(&self, command: DoorCommand) {
        self.state.lock().confirmations.push_back(command);
    }

    /// Every command the actuator accepted, in order.
    pub fn received(&self) -> Vec<DoorCommand> {
        self.state.lock().received.clone()
    }

    /// Last confirmed position.
    pub fn position(&self) -> ActuatorPosition {
        self.state.lock().position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_confirm() {
        let (mut actuator, handle) = MockActuator::new();
        assert_eq!(actuator.poll_confirmation().await.unwrap(), None);

        actuator.command(DoorCommand::Open).await.unwrap();
        assert_eq!(
            actuator.poll_confirmation().await.unwrap(),
            Some(DoorCommand::Open)
        );
        assert_eq!(handle.position(), ActuatorPosition::Open);
        assert_eq!(actuator.poll_confirmation().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_manual_confirm() {
        let (mut actuator, handle) = MockActuator::new();
        handle.set_auto_confirm(false);

        actuator.command(DoorCommand::Open).await.unwrap();
        assert_eq!(actuator.poll_confirmation().await.unwrap(), None);

        handle.confirm(DoorCommand::Open);
        assert_eq!(
            actuator.poll_confirmation().await.unwrap(),
            Some(DoorCommand::Open)
        );
    }

    #[tokio::test]
    async fn test_failing_actuator() {
        let (mut actuator, handle) = MockActuator::new();
        handle.set_failing(true);

        let result = actuator.command(DoorCommand::Close).await;
        assert!(matches!(
            result,
            Err(HardwareError::CommandRefused {
                command: DoorCommand::Close,
                ..
            })
        ));
        assert!(handle.received().is_empty());
    }
}
