//! Device declarations: sensors, actuators, controllers, and bridges.
//!
//! Declarations are pure data. The runtime binds each declaration to a
//! driver implementation at start time and validates the declared options
//! against the device's options schema before spawning its actor.

// Layer 1: Standard library imports
use std::collections::BTreeMap;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::name::Name;
use crate::schema::{Schema, Value};

/// Where a device is mounted in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mount {
    /// Robot-level device, supervised under the top-level group supervisor.
    Robot,
    /// Mounted on a link; supervised under that link's supervisor.
    Link(Name),
    /// Mounted on a joint; supervised under that joint's supervisor.
    Joint(Name),
}

/// Per-component substitution policy applied in simulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationPolicy {
    /// Do not start the component at all.
    Omit,
    /// Replace with a deterministic mock.
    Mock,
    /// Start the real implementation even in simulation.
    Real,
}

/// Options map supplied to a device at spawn time.
pub type Options = BTreeMap<Name, Value>;

/// Sensor declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDecl {
    /// Unique sensor name.
    pub name: Name,
    /// Driver type key resolved against the driver bindings at start.
    pub driver: Name,
    /// Mount point.
    pub mount: Mount,
    /// Declared options, validated against `options_schema` before spawn.
    pub options: Options,
    /// Contract the options must satisfy.
    pub options_schema: Schema,
}

/// Actuator declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorDecl {
    /// Unique actuator name.
    pub name: Name,
    /// Driver type key resolved against the driver bindings at start.
    pub driver: Name,
    /// Mount point (actuators always drive a joint).
    pub joint: Name,
    /// Declared options.
    pub options: Options,
    /// Contract the options must satisfy.
    pub options_schema: Schema,
}

/// Controller declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDecl {
    /// Unique controller name.
    pub name: Name,
    /// Driver type key resolved against the driver bindings at start.
    pub driver: Name,
    /// Declared options.
    pub options: Options,
    /// Contract the options must satisfy.
    pub options_schema: Schema,
    /// Substitution policy in simulation mode.
    pub simulation: SimulationPolicy,
}

/// Bridge declaration: mirrors local parameters to a remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeDecl {
    /// Unique bridge name; also the address for remote parameter calls.
    pub name: Name,
    /// Driver type key resolved against the driver bindings at start.
    pub driver: Name,
    /// Declared options.
    pub options: Options,
    /// Contract the options must satisfy.
    pub options_schema: Schema,
    /// Substitution policy in simulation mode.
    pub simulation: SimulationPolicy,
}
