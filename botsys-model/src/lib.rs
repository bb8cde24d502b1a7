//! # botsys-model - Robot Description Model
//!
//! Immutable, validated robot descriptions: links, joints, sensors,
//! actuators, controllers, bridges, commands, operational states, and
//! parameter schemas, with a pre-computed topology over the link/joint
//! tree.
//!
//! The description is pure data. It is constructed once through
//! [`RobotBuilder`], validated exhaustively at build time, and then shared
//! immutably with the runtime. All physical quantities are normalised to SI
//! base units (metres, radians, kilograms, newtons, N·m, m/s, rad/s).
//!
//! # Quick Start
//!
//! ```rust
//! use botsys_model::{
//!     Joint, JointKind, JointLimits, Link, RobotBuilder, Transform, Vec3,
//! };
//!
//! let robot = RobotBuilder::new("pan_tilt")
//!     .link(Link::new("base"))
//!     .link(Link::new("cam"))
//!     .joint(Joint {
//!         name: "pan".into(),
//!         kind: JointKind::Revolute,
//!         parent_link: "base".into(),
//!         child_link: "cam".into(),
//!         axis: Vec3::new(0.0, 0.0, 1.0),
//!         origin: Transform::identity(),
//!         limits: Some(JointLimits::symmetric(1.57, 10.0, 2.0)),
//!     })
//!     .build()?;
//!
//! assert_eq!(robot.topology().root().as_str(), "base");
//! # Ok::<(), botsys_model::ModelError>(())
//! ```
//!
//! # Module Organization
//!
//! - [`name`] / [`path`] - identifiers and name-sequence paths
//! - [`geometry`] - SI-unit geometric primitives
//! - [`link`] / [`joint`] - rigid bodies and their connections
//! - [`topology`] - parent/child relations, traversal order, path index
//! - [`device`] - sensor/actuator/controller/bridge declarations
//! - [`command`] - command and operational-state declarations
//! - [`schema`] - schema fragments and typed values
//! - [`builder`] / [`description`] - construction and the frozen result

pub mod builder;
pub mod command;
pub mod description;
pub mod device;
pub mod error;
pub mod geometry;
pub mod joint;
pub mod link;
pub mod name;
pub mod path;
pub mod schema;
pub mod topology;

// Re-export commonly used types
pub use builder::RobotBuilder;
pub use command::{
    CancelScope, Category, CommandDecl, COMMAND_ARM, COMMAND_DISARM, DEFAULT_CATEGORY,
    STATE_DISARMED, STATE_IDLE,
};
pub use description::RobotDescription;
pub use device::{
    ActuatorDecl, BridgeDecl, ControllerDecl, Mount, Options, SensorDecl, SimulationPolicy,
};
pub use error::ModelError;
pub use geometry::{
    deg_to_rad, Geometry, GeometryKind, Inertial, Quaternion, Rpy, Transform, Vec3,
    UNIT_NORM_TOLERANCE,
};
pub use joint::{Joint, JointKind, JointLimits};
pub use link::Link;
pub use name::Name;
pub use path::Path;
pub use schema::{Schema, SchemaEntry, Value, ValueType};
pub use topology::Topology;
