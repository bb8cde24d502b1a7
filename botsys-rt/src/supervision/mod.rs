//! Topology-mirroring supervision: backoff, supervisors, and the tree
//! builder.

pub mod backoff;
pub mod supervisor;
pub mod tree;

pub use backoff::RestartBackoff;
pub use supervisor::{
    ChildSpec, RestartPolicy, RunningChild, Supervisor, SupervisorConfig, SupervisorHandle,
};
pub use tree::{
    ActuatorFactory, BridgeFactory, ControllerFactory, DeviceBindings, SensorFactory,
    SimulationMode, TreeContext,
};
