//! Command handler contract, execution context, handles, and errors.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

// Layer 3: Internal module imports
use botsys_model::{Name, RobotDescription, Value};

use crate::actor::CallReply;
use crate::error::RuntimeError;
use crate::message::Envelope;
use crate::param::ParamRegistry;
use crate::pubsub::PubSubRouter;
use crate::registry::ProcessRegistry;
use crate::runtime::engine::RuntimeEngine;
use crate::safety::{SafetyController, SafetyPhase};
use crate::state::{RobotState, StateError};
use crate::util::ExecutionId;

/// Validated, defaulted named arguments of one execution.
pub type Goal = BTreeMap<Name, Value>;

/// What a handler wants to happen after a callback returns.
#[derive(Debug)]
pub enum Step {
    /// Keep running; wait for the next message.
    Continue,
    /// Keep running with a follow-up behaviour.
    ContinueThen(After),
    /// Terminate with the given reason; `result` is consulted for `Done`.
    Stop(StopReason),
}

/// Follow-up behaviour attached to a `Continue`.
#[derive(Debug)]
pub enum After {
    /// Invoke `handle_timeout` when no message arrives within the window.
    Timeout(Duration),
    /// Park until the next message (no timer).
    Hibernate,
    /// Invoke `handle_continue` with the tag before reading the mailbox.
    Continuation(Name),
}

/// Why a command actor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Normal completion; the handler's `result` supplies the outcome.
    Done,
    /// Stopped because safety left the armed state.
    Disarmed,
    /// Cancelled or preempted by the engine.
    Cancelled,
    /// Handler fault; carried into the outcome as a failure.
    Fault(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Done => f.write_str("done"),
            StopReason::Disarmed => f.write_str("disarmed"),
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::Fault(reason) => write!(f, "fault: {reason}"),
        }
    }
}

/// Successful command outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandValue {
    /// Caller-visible result value.
    pub value: Value,
    /// Operational state to transition to after completion.
    pub next_state: Option<Name>,
}

impl CommandValue {
    /// Outcome without a state transition.
    pub fn ok(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            next_state: None,
        }
    }

    /// Outcome that also transitions the operational state.
    pub fn ok_with_state(value: impl Into<Value>, next_state: impl Into<Name>) -> Self {
        Self {
            value: value.into(),
            next_state: Some(next_state.into()),
        }
    }
}

/// Command API failure, visible to dispatchers and awaiters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// No command with that name is declared.
    #[error("unknown command '{0}'")]
    UnknownCommand(Name),
    /// The current operational state is not in the command's allowed set.
    #[error("command '{command}' not allowed in state '{current}'")]
    StateNotAllowed {
        /// The rejected command.
        command: Name,
        /// State at dispatch time.
        current: Name,
        /// States the command accepts.
        allowed: Vec<Name>,
    },
    /// The category is at capacity and the cancel scope could not free room.
    #[error("category '{0}' is full")]
    CategoryFull(Name),
    /// Goal arguments failed schema validation.
    #[error("invalid goal: {} argument(s) rejected", failures.len())]
    InvalidGoal {
        /// Per-argument rejection reasons.
        failures: Vec<(Name, String)>,
    },
    /// The execution was cancelled or preempted.
    #[error("cancelled")]
    Cancelled,
    /// The execution stopped because safety left the armed state.
    #[error("stopped by safety disarm")]
    Disarmed,
    /// Waiting for the result timed out (the command may still be running).
    #[error("await timed out")]
    Timeout,
    /// The result retention window elapsed; the outcome is gone.
    #[error("result no longer recoverable")]
    Expired,
    /// The handler failed.
    #[error("command failed: {0}")]
    Failed(String),
}

/// A handler fault maps onto the uniform failure variant.
impl From<RuntimeError> for CommandError {
    fn from(err: RuntimeError) -> Self {
        CommandError::Failed(err.to_string())
    }
}

/// Result a command execution resolves to.
pub type CommandResult = Result<CommandValue, CommandError>;

/// Everything a running command can reach.
///
/// The context is the command's window into the runtime: the immutable
/// description, joint-state reads and writes, parameters, pub/sub, the
/// registry, the safety latch, and mid-command state transitions.
#[derive(Clone)]
pub struct CommandContext {
    pub(crate) execution_id: ExecutionId,
    pub(crate) command: Name,
    pub(crate) description: Arc<RobotDescription>,
    pub(crate) robot_state: RobotState,
    pub(crate) params: ParamRegistry,
    pub(crate) pubsub: PubSubRouter,
    pub(crate) registry: ProcessRegistry,
    pub(crate) safety: SafetyController,
    pub(crate) engine: RuntimeEngine,
}

impl CommandContext {
    /// Unique token of this execution.
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Name of the executing command.
    pub fn command(&self) -> &Name {
        &self.command
    }

    /// The immutable robot description.
    pub fn description(&self) -> &Arc<RobotDescription> {
        &self.description
    }

    /// Joint-state reads.
    pub fn robot_state(&self) -> &RobotState {
        &self.robot_state
    }

    /// Write one joint position. Commands are the runtime's writing arm;
    /// limits are enforced per the runtime options.
    pub fn set_joint_position(&self, joint: &Name, position: f64) -> Result<(), StateError> {
        self.robot_state.set_position(joint, position)
    }

    /// Batch joint-position write; readers never observe it half-applied.
    pub fn set_joint_positions(&self, updates: Vec<(Name, f64)>) -> Result<(), StateError> {
        self.robot_state.set_many(updates)
    }

    /// The parameter registry.
    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    /// The pub/sub router.
    pub fn pubsub(&self) -> &PubSubRouter {
        &self.pubsub
    }

    /// The process registry.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// The safety controller.
    pub fn safety(&self) -> &SafetyController {
        &self.safety
    }

    /// Transition the operational state mid-command.
    ///
    /// Verifies the target is declared, publishes the transition on
    /// `[state_machine]`, and preempts every *other* running command whose
    /// allowed states exclude the new state.
    pub async fn transition_state(&self, target: impl Into<Name>) -> Result<(), CommandError> {
        self.engine
            .transition_from_command(self.execution_id, target.into())
            .await
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("execution_id", &self.execution_id)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// The command handler contract.
///
/// A handler is a long-lived actor: `handle_command` runs once right after
/// spawn, then the asynchronous hooks run as messages arrive, until a
/// callback returns [`Step::Stop`] or the engine cancels the actor. The
/// goal arrives through the handler's factory, so handler state is plain
/// `self`.
///
/// All hooks are optional except `handle_command` and `result`.
#[async_trait]
pub trait CommandHandler: Send + 'static {
    /// Entry point, invoked once immediately after spawn.
    async fn handle_command(&mut self, ctx: &CommandContext) -> Result<Step, CommandError>;

    /// An envelope was forwarded into the actor mailbox.
    async fn handle_message(
        &mut self,
        _envelope: Envelope,
        _ctx: &CommandContext,
    ) -> Result<Step, CommandError> {
        Ok(Step::Continue)
    }

    /// Synchronous call from another actor; the reply is sent back before
    /// the step is applied.
    async fn handle_call(
        &mut self,
        _envelope: Envelope,
        _ctx: &CommandContext,
    ) -> (CallReply, Step) {
        (
            Err(RuntimeError::invalid("command accepts no calls")),
            Step::Continue,
        )
    }

    /// One-way cast from another actor.
    async fn handle_cast(
        &mut self,
        _envelope: Envelope,
        _ctx: &CommandContext,
    ) -> Result<Step, CommandError> {
        Ok(Step::Continue)
    }

    /// Deferred work scheduled with [`After::Continuation`].
    async fn handle_continue(
        &mut self,
        _tag: &Name,
        _ctx: &CommandContext,
    ) -> Result<Step, CommandError> {
        Ok(Step::Continue)
    }

    /// The [`After::Timeout`] window elapsed without a message. Most
    /// commands treat the quiet period as completion.
    async fn handle_timeout(&mut self, _ctx: &CommandContext) -> Result<Step, CommandError> {
        Ok(Step::Stop(StopReason::Done))
    }

    /// A parameter bound to one of this command's options changed.
    async fn handle_options(
        &mut self,
        _options: Goal,
        _ctx: &CommandContext,
    ) -> Result<Step, CommandError> {
        Ok(Step::Continue)
    }

    /// The safety controller left the armed state. The default stops the
    /// command; override to keep running through safety transitions (use
    /// with care).
    async fn handle_safety_state_change(
        &mut self,
        _phase: SafetyPhase,
        _ctx: &CommandContext,
    ) -> Result<Step, CommandError> {
        Ok(Step::Stop(StopReason::Disarmed))
    }

    /// Produce the caller-visible result. Invoked at normal termination
    /// ([`StopReason::Done`]); other stop reasons synthesise their own
    /// failure outcome.
    async fn result(&mut self, ctx: &CommandContext) -> CommandResult;

    /// Cleanup hook, invoked for every stop reason.
    async fn terminate(&mut self, _reason: &StopReason, _ctx: &CommandContext) {}
}

/// Creates handler instances from validated goals.
pub trait HandlerFactory: Send + Sync + 'static {
    /// Build a fresh handler for one execution.
    fn create(&self, goal: Goal) -> Box<dyn CommandHandler>;
}

impl<F> HandlerFactory for F
where
    F: Fn(Goal) -> Box<dyn CommandHandler> + Send + Sync + 'static,
{
    fn create(&self, goal: Goal) -> Box<dyn CommandHandler> {
        self(goal)
    }
}

/// Handler implementations keyed by the declaration's handler name.
#[derive(Clone, Default)]
pub struct HandlerBindings {
    factories: BTreeMap<Name, Arc<dyn HandlerFactory>>,
}

impl HandlerBindings {
    /// Empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` (the declaration's handler key) to a factory.
    pub fn bind(mut self, handler: impl Into<Name>, factory: Arc<dyn HandlerFactory>) -> Self {
        self.factories.insert(handler.into(), factory);
        self
    }

    /// Bind using a plain closure.
    pub fn bind_fn<F>(self, handler: impl Into<Name>, factory: F) -> Self
    where
        F: Fn(Goal) -> Box<dyn CommandHandler> + Send + Sync + 'static,
    {
        self.bind(handler, Arc::new(factory))
    }

    /// Resolve a handler key.
    pub fn get(&self, handler: &Name) -> Option<Arc<dyn HandlerFactory>> {
        self.factories.get(handler).map(Arc::clone)
    }

    /// Whether a handler key is bound.
    pub fn contains(&self, handler: &Name) -> bool {
        self.factories.contains_key(handler)
    }
}

impl fmt::Debug for HandlerBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

/// Cloneable reference to one execution, used to await, yield, or cancel.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    pub(crate) execution_id: ExecutionId,
    pub(crate) command: Name,
    pub(crate) category: Name,
    pub(crate) done: watch::Receiver<bool>,
}

impl CommandHandle {
    /// Unique token of the execution.
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Command name.
    pub fn command(&self) -> &Name {
        &self.command
    }

    /// Concurrency category the execution occupies.
    pub fn category(&self) -> &Name {
        &self.category
    }

    /// Whether the execution has terminated (result may still be cached).
    pub fn is_terminated(&self) -> bool {
        *self.done.borrow()
    }

    pub(crate) fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_value_builders() {
        let plain = CommandValue::ok(Value::Bool(true));
        assert_eq!(plain.next_state, None);

        let with_state = CommandValue::ok_with_state("armed", "idle");
        assert_eq!(with_state.value, Value::Str("armed".into()));
        assert_eq!(with_state.next_state, Some(Name::new("idle")));
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::StateNotAllowed {
            command: Name::new("move"),
            current: Name::new("disarmed"),
            allowed: vec![Name::new("idle")],
        };
        assert!(err.to_string().contains("move"));
        assert!(err.to_string().contains("disarmed"));
    }

    #[test]
    fn test_handler_bindings() {
        struct Noop;

        #[async_trait]
        impl CommandHandler for Noop {
            async fn handle_command(&mut self, _ctx: &CommandContext) -> Result<Step, CommandError> {
                Ok(Step::Stop(StopReason::Done))
            }

            async fn result(&mut self, _ctx: &CommandContext) -> CommandResult {
                Ok(CommandValue::ok(Value::Bool(true)))
            }
        }

        let bindings = HandlerBindings::new().bind_fn("noop", |_goal| Box::new(Noop));
        assert!(bindings.contains(&Name::new("noop")));
        assert!(bindings.get(&Name::new("ghost")).is_none());
    }
}
