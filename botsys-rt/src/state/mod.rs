//! Mutable robot joint state with tear-free snapshots.

pub mod robot_state;

pub use robot_state::{JointSnapshot, RobotState, StateError};
