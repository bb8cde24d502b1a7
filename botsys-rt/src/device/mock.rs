//! Deterministic mock actuator for kinematic simulation.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use botsys_model::Name;

use crate::device::actuator::{ActuatorDriver, MotionPlan};
use crate::device::context::DeviceContext;
use crate::error::RuntimeError;
use crate::message::{ActuatorCommand, ActuatorCommandKind, Repeat};

/// Kinematic-simulation stand-in for a hardware actuator.
///
/// Motions settle after the time a joint moving at its declared velocity
/// limit would need, so `BeginMotion.expected_arrival_ns` is exact and
/// repeatable.
pub struct MockActuator {
    joint: Name,
    /// Last commanded position, the starting point of the next motion.
    commanded: f64,
}

impl MockActuator {
    /// Mock driving `joint`.
    pub fn new(joint: Name) -> Self {
        Self {
            joint,
            commanded: 0.0,
        }
    }

    fn velocity_limit(&self, ctx: &DeviceContext) -> f64 {
        ctx.description
            .joint_limits(&self.joint)
            .map(|limits| limits.velocity)
            .unwrap_or(1.0)
    }
}

#[async_trait]
impl ActuatorDriver for MockActuator {
    async fn apply(
        &mut self,
        command: &ActuatorCommand,
        ctx: &DeviceContext,
    ) -> Result<MotionPlan, RuntimeError> {
        let velocity_limit = self.velocity_limit(ctx);
        let plan = match &command.kind {
            ActuatorCommandKind::Position { position } => {
                let distance = (position - self.commanded).abs();
                self.commanded = *position;
                MotionPlan::settling_in(Duration::from_secs_f64(distance / velocity_limit))
            }
            ActuatorCommandKind::Trajectory(trajectory) => {
                // Deterministic: one pass takes the last waypoint's offset.
                let pass = trajectory
                    .points
                    .last()
                    .map(|point| point.time_from_start)
                    .unwrap_or(0.0);
                if let Some(point) = trajectory.points.last() {
                    self.commanded = point.position;
                }
                match trajectory.repeat {
                    Repeat::Times(times) => MotionPlan::settling_in(Duration::from_secs_f64(
                        pass * f64::from(times),
                    )),
                    Repeat::Forever => MotionPlan::open_ended(),
                }
            }
            ActuatorCommandKind::Velocity { .. }
            | ActuatorCommandKind::Effort { .. }
            | ActuatorCommandKind::Hold => MotionPlan::open_ended(),
            ActuatorCommandKind::Stop { .. } => MotionPlan::open_ended(),
        };
        Ok(plan)
    }
}
