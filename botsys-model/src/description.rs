//! The immutable robot description consumed by the runtime.

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::command::{Category, CommandDecl};
use crate::device::{ActuatorDecl, BridgeDecl, ControllerDecl, SensorDecl};
use crate::joint::{Joint, JointLimits};
use crate::link::Link;
use crate::name::Name;
use crate::path::Path;
use crate::schema::Schema;
use crate::topology::Topology;

/// Validated, immutable robot description.
///
/// Construct through [`crate::RobotBuilder`]; every accessor is a plain
/// lookup into flat name-keyed tables. The description is shared by the
/// whole runtime behind an `Arc` and never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDescription {
    pub(crate) name: Name,
    pub(crate) links: HashMap<Name, Link>,
    pub(crate) joints: HashMap<Name, Joint>,
    pub(crate) sensors: HashMap<Name, SensorDecl>,
    pub(crate) actuators: HashMap<Name, ActuatorDecl>,
    pub(crate) controllers: HashMap<Name, ControllerDecl>,
    pub(crate) bridges: HashMap<Name, BridgeDecl>,
    pub(crate) commands: HashMap<Name, CommandDecl>,
    pub(crate) categories: Vec<Category>,
    /// Operational states in declaration order; always starts with the
    /// built-ins `disarmed`, `idle`.
    pub(crate) states: Vec<Name>,
    /// Parameter components registered at startup: component path -> schema.
    pub(crate) parameters: Vec<(Path, Schema)>,
    pub(crate) topology: Topology,
}

impl RobotDescription {
    /// Robot name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Link table.
    pub fn links(&self) -> &HashMap<Name, Link> {
        &self.links
    }

    /// Joint table.
    pub fn joints(&self) -> &HashMap<Name, Joint> {
        &self.joints
    }

    /// Sensor declarations.
    pub fn sensors(&self) -> &HashMap<Name, SensorDecl> {
        &self.sensors
    }

    /// Actuator declarations.
    pub fn actuators(&self) -> &HashMap<Name, ActuatorDecl> {
        &self.actuators
    }

    /// Controller declarations.
    pub fn controllers(&self) -> &HashMap<Name, ControllerDecl> {
        &self.controllers
    }

    /// Bridge declarations.
    pub fn bridges(&self) -> &HashMap<Name, BridgeDecl> {
        &self.bridges
    }

    /// Command declarations, built-ins included.
    pub fn commands(&self) -> &HashMap<Name, CommandDecl> {
        &self.commands
    }

    /// One command declaration.
    pub fn command(&self, name: &Name) -> Option<&CommandDecl> {
        self.commands.get(name)
    }

    /// Concurrency categories.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Operational states in declaration order (built-ins first).
    pub fn states(&self) -> &[Name] {
        &self.states
    }

    /// Whether `state` is a declared operational state.
    pub fn has_state(&self, state: &Name) -> bool {
        self.states.contains(state)
    }

    /// Parameter components registered at startup.
    pub fn parameters(&self) -> &[(Path, Schema)] {
        &self.parameters
    }

    /// Pre-computed topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Position limits of a joint, if declared.
    pub fn joint_limits(&self, joint: &Name) -> Option<&JointLimits> {
        self.joints.get(joint).and_then(|j| j.limits.as_ref())
    }

    /// Actuators driving `joint`, in declaration-independent name order.
    pub fn actuators_for_joint(&self, joint: &Name) -> Vec<&ActuatorDecl> {
        let mut out: Vec<_> = self
            .actuators
            .values()
            .filter(|a| &a.joint == joint)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Joints that carry runtime state (everything except fixed joints),
    /// in traversal order of their child links.
    pub fn actuated_joints(&self) -> Vec<&Joint> {
        self.topology
            .traversal()
            .iter()
            .filter_map(|link| self.topology.parent_joint(link))
            .filter_map(|joint| self.joints.get(joint))
            .filter(|joint| joint.kind.is_actuated())
            .collect()
    }
}
