//! Device actors: sensors, actuators, and controllers.

pub mod actuator;
pub mod context;
pub mod controller;
pub mod mock;
pub mod sensor;

pub use actuator::{ActuatorApi, ActuatorDriver, MotionPlan};
pub use context::DeviceContext;
pub use controller::ControllerDriver;
pub use mock::MockActuator;
pub use sensor::SensorDriver;
