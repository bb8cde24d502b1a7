//! Message fabric wire types: envelopes and tagged payloads.

pub mod envelope;
pub mod payload;

pub use envelope::Envelope;
pub use payload::{
    ActuatorCommand, ActuatorCommandKind, ActuatorFeedback, BatteryReading, ChangeSource,
    DiagnosticEvent, DiagnosticLevel, ImageReading, ImuReading, JointStateReading, LaserScan,
    ParameterChanged, Payload, PayloadKind, Pose, RangeReading, Repeat, StopMode, Trajectory,
    TrajectoryPoint, Transition, TransformReading, Twist, Wrench,
};
