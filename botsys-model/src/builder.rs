//! Builder producing a validated, immutable [`RobotDescription`].
//!
//! The builder is the only construction path for a description. `build()`
//! validates every declaration, injects the built-in operational states and
//! the built-in `arm`/`disarm` commands, and pre-computes the topology.

// Layer 1: Standard library imports
use std::collections::HashSet;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::command::{
    CancelScope, Category, CommandDecl, COMMAND_ARM, COMMAND_DISARM, DEFAULT_CATEGORY,
    STATE_DISARMED, STATE_IDLE,
};
use crate::description::RobotDescription;
use crate::device::{ActuatorDecl, BridgeDecl, ControllerDecl, Mount, SensorDecl};
use crate::error::ModelError;
use crate::joint::Joint;
use crate::link::Link;
use crate::name::Name;
use crate::path::Path;
use crate::schema::Schema;
use crate::topology::Topology;

/// Fluent builder for [`RobotDescription`].
///
/// # Examples
///
/// ```rust
/// use botsys_model::{
///     Joint, JointKind, JointLimits, Link, RobotBuilder, Transform, Vec3,
/// };
///
/// let robot = RobotBuilder::new("pan_tilt")
///     .link(Link::new("base"))
///     .link(Link::new("pan_link"))
///     .joint(Joint {
///         name: "pan".into(),
///         kind: JointKind::Revolute,
///         parent_link: "base".into(),
///         child_link: "pan_link".into(),
///         axis: Vec3::new(0.0, 0.0, 1.0),
///         origin: Transform::identity(),
///         limits: Some(JointLimits::symmetric(1.57, 10.0, 2.0)),
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(robot.topology().root().as_str(), "base");
/// assert!(robot.command(&"arm".into()).is_some());
/// ```
#[derive(Debug, Default)]
pub struct RobotBuilder {
    name: Name,
    links: Vec<Link>,
    joints: Vec<Joint>,
    sensors: Vec<SensorDecl>,
    actuators: Vec<ActuatorDecl>,
    controllers: Vec<ControllerDecl>,
    bridges: Vec<BridgeDecl>,
    commands: Vec<CommandDecl>,
    categories: Vec<Category>,
    states: Vec<Name>,
    parameters: Vec<(Path, Schema)>,
}

impl RobotBuilder {
    /// Start a description with the given robot name.
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declare a link.
    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Declare a joint.
    pub fn joint(mut self, joint: Joint) -> Self {
        self.joints.push(joint);
        self
    }

    /// Declare a sensor.
    pub fn sensor(mut self, sensor: SensorDecl) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Declare an actuator.
    pub fn actuator(mut self, actuator: ActuatorDecl) -> Self {
        self.actuators.push(actuator);
        self
    }

    /// Declare a controller.
    pub fn controller(mut self, controller: ControllerDecl) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Declare a bridge.
    pub fn bridge(mut self, bridge: BridgeDecl) -> Self {
        self.bridges.push(bridge);
        self
    }

    /// Declare a command.
    pub fn command(mut self, command: CommandDecl) -> Self {
        self.commands.push(command);
        self
    }

    /// Declare a concurrency category.
    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    /// Append a user-defined operational state (built-ins `disarmed` and
    /// `idle` are always present and need not be declared).
    pub fn state(mut self, state: impl Into<Name>) -> Self {
        self.states.push(state.into());
        self
    }

    /// Register a parameter component: every schema entry is merged at
    /// `component ++ entry-name` when the runtime starts.
    pub fn parameters(mut self, component: Path, schema: Schema) -> Self {
        self.parameters.push((component, schema));
        self
    }

    /// Validate everything and freeze the description.
    pub fn build(self) -> Result<RobotDescription, ModelError> {
        if self.name.is_empty() {
            return Err(ModelError::InvalidTopology("robot name is empty".to_string()));
        }

        // Operational states: built-ins first, then user states.
        let mut states = vec![Name::new(STATE_DISARMED), Name::new(STATE_IDLE)];
        for state in &self.states {
            if states.contains(state) {
                return Err(ModelError::InvalidState(format!(
                    "state '{state}' declared twice (or clashes with a built-in)"
                )));
            }
            states.push(state.clone());
        }

        // Categories: the default category always exists with limit 1.
        let mut categories = vec![Category::new(DEFAULT_CATEGORY, 1)];
        for category in &self.categories {
            if category.limit == 0 {
                return Err(ModelError::InvalidCommand {
                    command: category.name.clone(),
                    reason: "category limit must be at least 1".to_string(),
                });
            }
            if categories.iter().any(|c| c.name == category.name) {
                return Err(ModelError::DuplicateName(category.name.clone()));
            }
            categories.push(category.clone());
        }

        // Built-in commands. `arm` is only valid while disarmed and leads to
        // idle; `disarm` is valid everywhere and leads back to disarmed.
        let mut commands = self.commands.clone();
        commands.push(
            CommandDecl::new(COMMAND_ARM, COMMAND_ARM).allowed_in([STATE_DISARMED]),
        );
        commands.push(
            CommandDecl::new(COMMAND_DISARM, COMMAND_DISARM)
                .allowed_in(states.iter().cloned())
                .with_cancel(CancelScope::All),
        );

        // Unique-name invariant across every category.
        let mut seen: HashSet<&Name> = HashSet::new();
        let all_names = self
            .links
            .iter()
            .map(|l| &l.name)
            .chain(self.joints.iter().map(|j| &j.name))
            .chain(self.sensors.iter().map(|s| &s.name))
            .chain(self.actuators.iter().map(|a| &a.name))
            .chain(self.controllers.iter().map(|c| &c.name))
            .chain(self.bridges.iter().map(|b| &b.name))
            .chain(commands.iter().map(|c| &c.name));
        for name in all_names {
            if !seen.insert(name) {
                return Err(ModelError::DuplicateName(name.clone()));
            }
        }

        // Per-entity consistency.
        for link in &self.links {
            link.check()?;
        }
        for joint in &self.joints {
            joint.check()?;
        }
        for command in &commands {
            command.check(&states, &categories)?;
        }

        // Device references and option schemas.
        let link_names: Vec<Name> = self.links.iter().map(|l| l.name.clone()).collect();
        let joint_names: Vec<Name> = self.joints.iter().map(|j| j.name.clone()).collect();
        for sensor in &self.sensors {
            match &sensor.mount {
                Mount::Robot => {}
                Mount::Link(link) if link_names.contains(link) => {}
                Mount::Joint(joint) if joint_names.contains(joint) => {}
                Mount::Link(name) | Mount::Joint(name) => {
                    return Err(ModelError::UnknownReference {
                        reference: name.clone(),
                        context: format!("sensor '{}'", sensor.name),
                    })
                }
            }
            sensor.options_schema.check()?;
        }
        for actuator in &self.actuators {
            if !joint_names.contains(&actuator.joint) {
                return Err(ModelError::UnknownReference {
                    reference: actuator.joint.clone(),
                    context: format!("actuator '{}'", actuator.name),
                });
            }
            actuator.options_schema.check()?;
        }
        for controller in &self.controllers {
            controller.options_schema.check()?;
        }
        for bridge in &self.bridges {
            bridge.options_schema.check()?;
        }

        // Parameter component schemas.
        for (component, schema) in &self.parameters {
            schema.check().map_err(|e| {
                ModelError::InvalidSchema(format!("component {component}: {e}"))
            })?;
        }

        let topology = Topology::build(&link_names, &self.joints)?;

        Ok(RobotDescription {
            name: self.name,
            links: self.links.into_iter().map(|l| (l.name.clone(), l)).collect(),
            joints: self.joints.into_iter().map(|j| (j.name.clone(), j)).collect(),
            sensors: self
                .sensors
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
            actuators: self
                .actuators
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
            controllers: self
                .controllers
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            bridges: self
                .bridges
                .into_iter()
                .map(|b| (b.name.clone(), b))
                .collect(),
            commands: commands.into_iter().map(|c| (c.name.clone(), c)).collect(),
            categories,
            states,
            parameters: self.parameters,
            topology,
        })
    }
}
