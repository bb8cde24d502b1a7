//! Built-in `arm` and `disarm` command handlers.
//!
//! Every description declares these commands; the runtime binds the
//! handlers automatically. `arm` flips the safety latch and moves the
//! state machine to `idle`; `disarm` runs the safety cascade and returns
//! to `disarmed` from any state.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use botsys_model::{COMMAND_ARM, COMMAND_DISARM, STATE_DISARMED, STATE_IDLE};

use crate::runtime::command::{
    CommandContext, CommandError, CommandHandler, CommandResult, CommandValue, HandlerBindings,
    Step, StopReason,
};
use crate::safety::{SafetyError, SafetyPhase};

struct ArmHandler;

#[async_trait]
impl CommandHandler for ArmHandler {
    async fn handle_command(&mut self, ctx: &CommandContext) -> Result<Step, CommandError> {
        match ctx.safety().arm() {
            Ok(()) => Ok(Step::Stop(StopReason::Done)),
            Err(SafetyError::AlreadyArmed) => {
                Ok(Step::Stop(StopReason::Fault("already armed".to_string())))
            }
            Err(SafetyError::InError) => Ok(Step::Stop(StopReason::Fault(
                "safety latch in error, force_disarm first".to_string(),
            ))),
            Err(other) => Ok(Step::Stop(StopReason::Fault(other.to_string()))),
        }
    }

    async fn result(&mut self, _ctx: &CommandContext) -> CommandResult {
        Ok(CommandValue::ok_with_state("armed", STATE_IDLE))
    }
}

struct DisarmHandler;

#[async_trait]
impl CommandHandler for DisarmHandler {
    async fn handle_command(&mut self, ctx: &CommandContext) -> Result<Step, CommandError> {
        match ctx.safety().disarm().await {
            Ok(()) => Ok(Step::Stop(StopReason::Done)),
            Err(err) => Ok(Step::Stop(StopReason::Fault(err.to_string()))),
        }
    }

    /// The disarm command is itself the source of the safety transition;
    /// it must not stop on its own notification.
    async fn handle_safety_state_change(
        &mut self,
        _phase: SafetyPhase,
        _ctx: &CommandContext,
    ) -> Result<Step, CommandError> {
        Ok(Step::Continue)
    }

    async fn result(&mut self, _ctx: &CommandContext) -> CommandResult {
        Ok(CommandValue::ok_with_state("disarmed", STATE_DISARMED))
    }
}

/// Add the built-in handler factories to a set of bindings.
pub fn bind_builtins(bindings: HandlerBindings) -> HandlerBindings {
    bindings
        .bind_fn(COMMAND_ARM, |_goal| Box::new(ArmHandler))
        .bind_fn(COMMAND_DISARM, |_goal| Box::new(DisarmHandler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use botsys_model::{
        Joint, JointKind, JointLimits, Link, Name, RobotBuilder, RobotDescription, Transform,
        Value, Vec3,
    };

    use crate::param::ParamRegistry;
    use crate::pubsub::PubSubRouter;
    use crate::registry::ProcessRegistry;
    use crate::runtime::engine::{EngineConfig, RuntimeEngine};
    use crate::runtime::command::Goal;
    use crate::safety::SafetyController;
    use crate::state::RobotState;

    fn description() -> Arc<RobotDescription> {
        Arc::new(
            RobotBuilder::new("pan_tilt")
                .link(Link::new("base"))
                .link(Link::new("cam"))
                .joint(Joint {
                    name: "pan".into(),
                    kind: JointKind::Revolute,
                    parent_link: "base".into(),
                    child_link: "cam".into(),
                    axis: Vec3::new(0.0, 0.0, 1.0),
                    origin: Transform::identity(),
                    limits: Some(JointLimits::symmetric(1.57, 10.0, 2.0)),
                })
                .build()
                .unwrap(),
        )
    }

    fn engine() -> RuntimeEngine {
        let description = description();
        let pubsub = PubSubRouter::new();
        let params = ParamRegistry::new(pubsub.clone());
        let safety = SafetyController::new(pubsub.clone());
        let robot_state = RobotState::new(Arc::clone(&description), true);
        RuntimeEngine::new(
            description,
            ProcessRegistry::new(),
            pubsub,
            params,
            safety,
            robot_state,
            bind_builtins(HandlerBindings::new()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_arm_transitions_to_idle() {
        let engine = engine();
        assert_eq!(engine.operational_state(), Name::new(STATE_DISARMED));

        let handle = engine
            .execute(&Name::new(COMMAND_ARM), Goal::new())
            .await
            .unwrap();
        let result = engine.await_result(&handle, None).await.unwrap();

        assert_eq!(result.value, Value::Str("armed".into()));
        assert_eq!(result.next_state, Some(Name::new(STATE_IDLE)));
        assert_eq!(engine.operational_state(), Name::new(STATE_IDLE));
    }

    #[tokio::test]
    async fn test_arm_twice_rejected_by_state_guard() {
        let engine = engine();
        let handle = engine
            .execute(&Name::new(COMMAND_ARM), Goal::new())
            .await
            .unwrap();
        engine.await_result(&handle, None).await.unwrap();

        // Now in idle; arm is only allowed while disarmed.
        let err = engine
            .execute(&Name::new(COMMAND_ARM), Goal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::StateNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_disarm_round_trip() {
        let engine = engine();
        let handle = engine
            .execute(&Name::new(COMMAND_ARM), Goal::new())
            .await
            .unwrap();
        engine.await_result(&handle, None).await.unwrap();
        assert!(engine.description().has_state(&Name::new(STATE_IDLE)));

        let handle = engine
            .execute(&Name::new(COMMAND_DISARM), Goal::new())
            .await
            .unwrap();
        let result = engine.await_result(&handle, None).await.unwrap();
        assert_eq!(result.next_state, Some(Name::new(STATE_DISARMED)));
        assert_eq!(engine.operational_state(), Name::new(STATE_DISARMED));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let engine = engine();
        let err = engine
            .execute(&Name::new("warp"), Goal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(_)));
    }
}
