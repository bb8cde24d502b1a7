//! Safety controller: armed/disarmed/error latch and disarm callbacks.

pub mod controller;

pub use controller::{
    DisarmCallback, DisarmFailure, SafetyController, SafetyError, SafetyPhase, SafetyState,
};
