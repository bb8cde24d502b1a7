//! Tagged payload union carried by every envelope.
//!
//! Each payload type carries its own validity contract, checked when an
//! envelope is constructed: a payload the fabric delivers is well-formed by
//! construction. Validation failures surface as `ErrorKind::Invalid`.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
use botsys_model::{Name, Path, Quaternion, Value, Vec3};

use crate::error::RuntimeError;

/// Inertial measurement reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuReading {
    /// Orientation as a unit quaternion.
    pub orientation: Quaternion,
    /// Angular velocity (rad/s).
    pub angular_velocity: Vec3,
    /// Linear acceleration (m/s²).
    pub linear_acceleration: Vec3,
}

/// Joint positions with optional velocities and efforts.
///
/// `velocities` and `efforts` are either empty or the same length as
/// `names`/`positions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointStateReading {
    /// Joint names.
    pub names: Vec<Name>,
    /// Positions (rad or m).
    pub positions: Vec<f64>,
    /// Velocities (rad/s or m/s); empty when unknown.
    pub velocities: Vec<f64>,
    /// Efforts (N·m or N); empty when unknown.
    pub efforts: Vec<f64>,
}

/// Planar laser scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    /// Start angle (rad).
    pub angle_min: f64,
    /// End angle (rad).
    pub angle_max: f64,
    /// Angular step between rays (rad).
    pub angle_increment: f64,
    /// Minimum valid range (m).
    pub range_min: f64,
    /// Maximum valid range (m).
    pub range_max: f64,
    /// Measured ranges (m).
    pub ranges: Vec<f64>,
}

/// Single-beam range reading (ultrasound, IR).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeReading {
    /// Minimum measurable range (m).
    pub min_range: f64,
    /// Maximum measurable range (m).
    pub max_range: f64,
    /// Measured range (m).
    pub range: f64,
}

/// Raw image frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReading {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel encoding tag (e.g. `rgb8`, `mono8`).
    pub encoding: String,
    /// Row-major pixel data.
    pub data: Vec<u8>,
}

/// Battery state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    /// Terminal voltage (V).
    pub voltage: f64,
    /// Charge fraction in `0.0..=1.0`.
    pub percentage: f64,
    /// Signed current (A); negative while discharging.
    pub current: f64,
}

/// Position and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position (m).
    pub position: Vec3,
    /// Orientation as a unit quaternion.
    pub orientation: Quaternion,
}

/// Linear and angular velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    /// Linear velocity (m/s).
    pub linear: Vec3,
    /// Angular velocity (rad/s).
    pub angular: Vec3,
}

/// Force and torque.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wrench {
    /// Force (N).
    pub force: Vec3,
    /// Torque (N·m).
    pub torque: Vec3,
}

/// Transform between the envelope frame and a child frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformReading {
    /// Frame the transform points to.
    pub child_frame: Name,
    /// Translation (m).
    pub translation: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quaternion,
}

/// One trajectory waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Target position (rad or m).
    pub position: f64,
    /// Target velocity at the waypoint (rad/s or m/s).
    pub velocity: f64,
    /// Target acceleration at the waypoint (rad/s² or m/s²).
    pub acceleration: f64,
    /// Offset from trajectory start (s).
    pub time_from_start: f64,
}

/// How often a trajectory repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    /// Run the trajectory `n` times (`n >= 1`).
    Times(u32),
    /// Repeat until stopped.
    Forever,
}

/// How a stop command takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// Cut motion immediately.
    Immediate,
    /// Ramp down within the actuator's deceleration limits.
    Decelerate,
}

/// Waypoint sequence with its repeat policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Waypoints ordered by `time_from_start`.
    pub points: Vec<TrajectoryPoint>,
    /// Repeat policy.
    pub repeat: Repeat,
}

/// The motion requested from an actuator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorCommandKind {
    /// Move to a position (rad or m).
    Position {
        /// Target position.
        position: f64,
    },
    /// Track a velocity (rad/s or m/s).
    Velocity {
        /// Target velocity.
        velocity: f64,
    },
    /// Apply an effort (N·m or N).
    Effort {
        /// Target effort.
        effort: f64,
    },
    /// Follow a trajectory.
    Trajectory(Trajectory),
    /// Stop motion.
    Stop {
        /// Stop behaviour.
        mode: StopMode,
    },
    /// Actively hold the current position.
    Hold,
}

/// A command addressed to an actuator, with an optional correlation token
/// echoed back in feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    /// Correlation token; actuators echo it in `BeginMotion`/`EndMotion`.
    pub command_id: Option<Uuid>,
    /// Requested motion.
    pub kind: ActuatorCommandKind,
}

impl ActuatorCommand {
    /// Wrap a command kind without a correlation token.
    pub fn new(kind: ActuatorCommandKind) -> Self {
        Self {
            command_id: None,
            kind,
        }
    }

    /// Builder: attach a correlation token.
    pub fn with_command_id(mut self, command_id: Uuid) -> Self {
        self.command_id = Some(command_id);
        self
    }
}

/// Feedback emitted by actuators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorFeedback {
    /// Motion started.
    BeginMotion {
        /// Correlation token of the causing command.
        command_id: Option<Uuid>,
        /// Predicted completion stamp (monotonic ns), when computable.
        expected_arrival_ns: Option<i64>,
    },
    /// Motion finished.
    EndMotion {
        /// Correlation token of the causing command.
        command_id: Option<Uuid>,
    },
}

/// Origin of a parameter mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Default applied at component registration.
    Init,
    /// Loaded from the durable store at startup.
    Persisted,
    /// Local API write.
    Api,
    /// Write forwarded from a remote bridge.
    Bridge,
}

/// A parameter mutation event, published on `[param | path]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChanged {
    /// Full parameter path.
    pub path: Path,
    /// Previous value; `None` on first registration.
    pub old: Option<Value>,
    /// New value.
    pub new: Value,
    /// Who caused the change.
    pub source: ChangeSource,
}

/// An operational-state transition, published on `[state_machine]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// State before.
    pub from: Name,
    /// State after.
    pub to: Name,
}

/// Diagnostic level for observability events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Component healthy.
    Ok,
    /// Degraded but operating.
    Warn,
    /// Component failed.
    Error,
    /// No fresh data from the component.
    Stale,
}

/// Observability event published on `[diagnostic]`. Diagnostics inform
/// observers; errors still flow to callers as values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// Component that produced the event.
    pub source: Name,
    /// Health level.
    pub level: DiagnosticLevel,
    /// Free-form description.
    pub message: String,
    /// Wall-clock time the event was recorded.
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticEvent {
    /// Record an event now.
    pub fn new(source: impl Into<Name>, level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The tagged union every envelope carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// IMU reading.
    Imu(ImuReading),
    /// Joint state reading.
    JointState(JointStateReading),
    /// Laser scan.
    LaserScan(LaserScan),
    /// Single-beam range.
    Range(RangeReading),
    /// Image frame.
    Image(ImageReading),
    /// Battery state.
    Battery(BatteryReading),
    /// Pose.
    Pose(Pose),
    /// Twist.
    Twist(Twist),
    /// Wrench.
    Wrench(Wrench),
    /// Transform.
    Transform(TransformReading),
    /// Actuator command.
    ActuatorCommand(ActuatorCommand),
    /// Actuator feedback.
    ActuatorFeedback(ActuatorFeedback),
    /// Parameter change event.
    ParameterChanged(ParameterChanged),
    /// Operational-state transition.
    Transition(Transition),
    /// Diagnostic event.
    Diagnostic(DiagnosticEvent),
}

/// Discriminant of [`Payload`], used by subscription type filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// IMU reading.
    Imu,
    /// Joint state reading.
    JointState,
    /// Laser scan.
    LaserScan,
    /// Single-beam range.
    Range,
    /// Image frame.
    Image,
    /// Battery state.
    Battery,
    /// Pose.
    Pose,
    /// Twist.
    Twist,
    /// Wrench.
    Wrench,
    /// Transform.
    Transform,
    /// Actuator command.
    ActuatorCommand,
    /// Actuator feedback.
    ActuatorFeedback,
    /// Parameter change event.
    ParameterChanged,
    /// Operational-state transition.
    Transition,
    /// Diagnostic event.
    Diagnostic,
}

impl Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadKind::Imu => "imu",
            PayloadKind::JointState => "joint_state",
            PayloadKind::LaserScan => "laser_scan",
            PayloadKind::Range => "range",
            PayloadKind::Image => "image",
            PayloadKind::Battery => "battery",
            PayloadKind::Pose => "pose",
            PayloadKind::Twist => "twist",
            PayloadKind::Wrench => "wrench",
            PayloadKind::Transform => "transform",
            PayloadKind::ActuatorCommand => "actuator_command",
            PayloadKind::ActuatorFeedback => "actuator_feedback",
            PayloadKind::ParameterChanged => "parameter_changed",
            PayloadKind::Transition => "transition",
            PayloadKind::Diagnostic => "diagnostic",
        };
        f.write_str(s)
    }
}

impl Payload {
    /// The discriminant used by subscription filters.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Imu(_) => PayloadKind::Imu,
            Payload::JointState(_) => PayloadKind::JointState,
            Payload::LaserScan(_) => PayloadKind::LaserScan,
            Payload::Range(_) => PayloadKind::Range,
            Payload::Image(_) => PayloadKind::Image,
            Payload::Battery(_) => PayloadKind::Battery,
            Payload::Pose(_) => PayloadKind::Pose,
            Payload::Twist(_) => PayloadKind::Twist,
            Payload::Wrench(_) => PayloadKind::Wrench,
            Payload::Transform(_) => PayloadKind::Transform,
            Payload::ActuatorCommand(_) => PayloadKind::ActuatorCommand,
            Payload::ActuatorFeedback(_) => PayloadKind::ActuatorFeedback,
            Payload::ParameterChanged(_) => PayloadKind::ParameterChanged,
            Payload::Transition(_) => PayloadKind::Transition,
            Payload::Diagnostic(_) => PayloadKind::Diagnostic,
        }
    }

    /// Validate the payload's own contract.
    ///
    /// Called by [`crate::message::Envelope::new`]; a payload inside a
    /// delivered envelope is always valid.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        match self {
            Payload::Imu(imu) => {
                if !imu.orientation.is_unit() {
                    return Err(RuntimeError::invalid(format!(
                        "imu orientation is not a unit quaternion (norm {})",
                        imu.orientation.norm()
                    )));
                }
                Ok(())
            }
            Payload::JointState(js) => {
                if js.names.len() != js.positions.len() {
                    return Err(RuntimeError::invalid(format!(
                        "joint_state has {} names but {} positions",
                        js.names.len(),
                        js.positions.len()
                    )));
                }
                for (label, series) in [("velocities", &js.velocities), ("efforts", &js.efforts)] {
                    if !series.is_empty() && series.len() != js.names.len() {
                        return Err(RuntimeError::invalid(format!(
                            "joint_state {label} length {} does not match {} names",
                            series.len(),
                            js.names.len()
                        )));
                    }
                }
                Ok(())
            }
            Payload::LaserScan(scan) => {
                if scan.angle_max < scan.angle_min {
                    return Err(RuntimeError::invalid("laser_scan angle_max < angle_min"));
                }
                if scan.range_min < 0.0 || scan.range_max < scan.range_min {
                    return Err(RuntimeError::invalid("laser_scan range bounds inverted"));
                }
                if scan.ranges.is_empty() {
                    return Err(RuntimeError::invalid("laser_scan has no rays"));
                }
                Ok(())
            }
            Payload::Range(range) => {
                if range.min_range < 0.0 || range.max_range < range.min_range {
                    return Err(RuntimeError::invalid("range bounds inverted"));
                }
                Ok(())
            }
            Payload::Image(image) => {
                if image.width == 0 || image.height == 0 {
                    return Err(RuntimeError::invalid("image has zero dimension"));
                }
                Ok(())
            }
            Payload::Battery(battery) => {
                if !(0.0..=1.0).contains(&battery.percentage) {
                    return Err(RuntimeError::invalid(format!(
                        "battery percentage {} outside 0..=1",
                        battery.percentage
                    )));
                }
                Ok(())
            }
            Payload::Pose(pose) => {
                if !pose.orientation.is_unit() {
                    return Err(RuntimeError::invalid("pose orientation is not a unit quaternion"));
                }
                Ok(())
            }
            Payload::Transform(tf) => {
                if !tf.rotation.is_unit() {
                    return Err(RuntimeError::invalid(
                        "transform rotation is not a unit quaternion",
                    ));
                }
                Ok(())
            }
            Payload::ActuatorCommand(command) => match &command.kind {
                ActuatorCommandKind::Trajectory(trajectory) => {
                    if trajectory.points.is_empty() {
                        return Err(RuntimeError::invalid("trajectory has no waypoints"));
                    }
                    if let Repeat::Times(0) = trajectory.repeat {
                        return Err(RuntimeError::invalid("trajectory repeat count must be >= 1"));
                    }
                    let ordered = trajectory
                        .points
                        .windows(2)
                        .all(|w| w[0].time_from_start <= w[1].time_from_start);
                    if !ordered {
                        return Err(RuntimeError::invalid(
                            "trajectory waypoints not ordered by time_from_start",
                        ));
                    }
                    if trajectory.points.iter().any(|p| p.time_from_start < 0.0) {
                        return Err(RuntimeError::invalid("trajectory time_from_start is negative"));
                    }
                    Ok(())
                }
                _ => Ok(()),
            },
            Payload::Twist(_)
            | Payload::Wrench(_)
            | Payload::ActuatorFeedback(_)
            | Payload::ParameterChanged(_)
            | Payload::Transition(_)
            | Payload::Diagnostic(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imu_requires_unit_quaternion() {
        let mut imu = ImuReading {
            orientation: Quaternion::identity(),
            angular_velocity: Vec3::zero(),
            linear_acceleration: Vec3::new(0.0, 0.0, 9.81),
        };
        assert!(Payload::Imu(imu.clone()).validate().is_ok());

        imu.orientation = Quaternion::new(1.0, 1.0, 0.0, 1.0);
        assert!(Payload::Imu(imu).validate().is_err());
    }

    #[test]
    fn test_joint_state_length_contract() {
        let ok = JointStateReading {
            names: vec![Name::new("pan"), Name::new("tilt")],
            positions: vec![0.1, 0.2],
            velocities: vec![],
            efforts: vec![0.0, 0.0],
        };
        assert!(Payload::JointState(ok).validate().is_ok());

        let bad = JointStateReading {
            names: vec![Name::new("pan")],
            positions: vec![0.1, 0.2],
            velocities: vec![],
            efforts: vec![],
        };
        assert!(Payload::JointState(bad).validate().is_err());

        let bad_velocities = JointStateReading {
            names: vec![Name::new("pan")],
            positions: vec![0.1],
            velocities: vec![0.0, 0.0],
            efforts: vec![],
        };
        assert!(Payload::JointState(bad_velocities).validate().is_err());
    }

    #[test]
    fn test_battery_percentage_bounds() {
        let battery = BatteryReading {
            voltage: 12.6,
            percentage: 1.2,
            current: -0.4,
        };
        assert!(Payload::Battery(battery).validate().is_err());
    }

    #[test]
    fn test_trajectory_contract() {
        let point = |t: f64| TrajectoryPoint {
            position: 0.0,
            velocity: 0.0,
            acceleration: 0.0,
            time_from_start: t,
        };

        let unordered = ActuatorCommand::new(ActuatorCommandKind::Trajectory(Trajectory {
            points: vec![point(1.0), point(0.5)],
            repeat: Repeat::Forever,
        }));
        assert!(Payload::ActuatorCommand(unordered).validate().is_err());

        let zero_repeat = ActuatorCommand::new(ActuatorCommandKind::Trajectory(Trajectory {
            points: vec![point(0.0)],
            repeat: Repeat::Times(0),
        }));
        assert!(Payload::ActuatorCommand(zero_repeat).validate().is_err());

        let ok = ActuatorCommand::new(ActuatorCommandKind::Trajectory(Trajectory {
            points: vec![point(0.0), point(0.5)],
            repeat: Repeat::Times(2),
        }));
        assert!(Payload::ActuatorCommand(ok).validate().is_ok());
    }

    #[test]
    fn test_kind_discriminants() {
        let stop = Payload::ActuatorCommand(ActuatorCommand::new(ActuatorCommandKind::Stop {
            mode: StopMode::Decelerate,
        }));
        assert_eq!(stop.kind(), PayloadKind::ActuatorCommand);
        assert_eq!(stop.kind().to_string(), "actuator_command");
    }
}
