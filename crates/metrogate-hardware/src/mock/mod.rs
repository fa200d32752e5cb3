//! Mock device implementations for testing and development.
//!
//! Each mock is created as a `(device, handle)` pair: the device goes to the
//! sensor loop, the handle stays with the test or simulator driving it.

pub mod actuator;
pub mod beams;

pub use actuator::{MockActuator, MockActuatorHandle};
pub use beams::{MockBeamSensor, MockBeamSensorHandle};
