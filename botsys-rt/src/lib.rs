//! # botsys-rt - Robotics Orchestration Runtime
//!
//! Turns an immutable [`botsys_model`] robot description into a living,
//! fault-isolated process graph: one lightweight actor per sensor,
//! actuator, controller, bridge, and running command, supervised in a
//! tree that mirrors the physical topology, wired together by a
//! hierarchical pub/sub fabric, a runtime command engine with
//! state-machine guards and preemption, a safety controller with
//! crash-surviving disarm callbacks, and a schema-validated parameter
//! registry with durable storage and remote bridges.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use botsys_rt::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let description = build_description()?; // botsys_model::RobotBuilder
//!     let robot = Robot::start(
//!         description,
//!         HandlerBindings::new().bind_fn("move", |goal| Box::new(MoveHandler::new(goal))),
//!         DeviceBindings::new(),
//!         RobotOptions::new().simulation(SimulationMode::Kinematic),
//!     )
//!     .await?;
//!
//!     let handle = robot.execute("arm", Goal::new()).await?;
//!     robot.await_result(&handle, None).await?;
//!     assert!(robot.armed());
//!
//!     robot.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! ## Fabric
//! - [`message`] - envelopes and the tagged payload union
//! - [`mailbox`] - bounded/unbounded actor mailboxes
//! - [`pubsub`] - prefix-matching router with type filters
//! - [`registry`] - unique and duplicate name keyspaces
//!
//! ## Coordination
//! - [`runtime`] - the command engine: state machine, categories,
//!   preemption, result cache
//! - [`safety`] - the armed/disarmed/error latch and disarm callbacks
//! - [`param`] - the parameter registry and durable stores
//! - [`state`] - joint state with tear-free snapshots
//!
//! ## Process graph
//! - [`supervision`] - restart backoff, supervisors, the tree builder
//! - [`device`] - sensor/actuator/controller drivers and actors
//! - [`bridge`] - remote parameter mirroring
//! - [`robot`] - the start/stop facade
//!
//! # Concurrency Model
//!
//! Many actors communicating by message passing, each with private state;
//! the hot shared tables (registry, safety latch, parameter values, joint
//! state) are designated shared-read with serialised writers. Messages
//! between any two actors arrive in send order; pub/sub delivery is
//! per-publisher FIFO with no cross-publisher ordering promise.

pub mod actor;
pub mod bridge;
pub mod device;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod param;
pub mod pubsub;
pub mod registry;
pub mod robot;
pub mod runtime;
pub mod safety;
pub mod state;
pub mod supervision;
pub mod util;

// Re-export commonly used types
pub use actor::{ActorHandle, ActorKind, BusMsg, CallReply};
pub use bridge::{Bridge, RemoteParam};
pub use device::{
    ActuatorApi, ActuatorDriver, ControllerDriver, DeviceContext, MockActuator, MotionPlan,
    SensorDriver,
};
pub use error::{ErrorKind, RuntimeError, Severity};
pub use mailbox::{MailboxReceiver, MailboxSender, OverflowPolicy, SendError};
pub use message::{Envelope, Payload, PayloadKind};
pub use param::{FileParamStore, MemoryParamStore, ParamError, ParamRegistry, ParamStore};
pub use pubsub::{PubSubRouter, SubscribeOptions, Subscription};
pub use registry::{DuplicateRegistry, ProcessRegistry, RegistryError};
pub use robot::{Robot, RobotOptions};
pub use runtime::{
    After, CommandContext, CommandError, CommandHandle, CommandHandler, CommandResult,
    CommandValue, Goal, HandlerBindings, RuntimeEngine, Step, StopReason,
};
pub use safety::{DisarmCallback, SafetyController, SafetyError, SafetyPhase, SafetyState};
pub use state::{JointSnapshot, RobotState};
pub use supervision::{
    ChildSpec, DeviceBindings, RestartBackoff, RestartPolicy, SimulationMode, Supervisor,
    SupervisorConfig, SupervisorHandle,
};
pub use util::{ExecutionId, SubscriptionId};

/// One-stop imports for applications.
pub mod prelude {
    pub use crate::device::{ActuatorDriver, ControllerDriver, DeviceContext, SensorDriver};
    pub use crate::error::{ErrorKind, RuntimeError, Severity};
    pub use crate::message::{Envelope, Payload, PayloadKind};
    pub use crate::robot::{Robot, RobotOptions};
    pub use crate::runtime::{
        After, CommandContext, CommandError, CommandHandler, CommandResult, CommandValue, Goal,
        HandlerBindings, Step, StopReason,
    };
    pub use crate::supervision::{DeviceBindings, SimulationMode};
    pub use botsys_model::{
        Joint, JointKind, JointLimits, Link, Name, Path, RobotBuilder, RobotDescription, Schema,
        SchemaEntry, Value, ValueType,
    };
}
