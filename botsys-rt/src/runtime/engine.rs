//! The runtime engine: dispatch, preemption, transitions, and results.
//!
//! One engine per robot. It owns the operational-state machine, the
//! category table, the live-command set, and the result cache; it spawns
//! command actors, enforces the state guard and category caps, preempts on
//! capacity and on state transitions, and recovers results after actor
//! death through the retention cache.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use botsys_model::{CancelScope, Name, Path, RobotDescription, Value};

use crate::actor::{ActorHandle, ActorKind, BusMsg};
use crate::mailbox::{mailbox, OverflowPolicy};
use crate::message::{Envelope, Payload, PayloadKind};
use crate::param::ParamRegistry;
use crate::pubsub::{PubSubRouter, SubscribeOptions};
use crate::registry::ProcessRegistry;
use crate::runtime::actor;
use crate::runtime::categories::CategoryTable;
use crate::runtime::command::{
    CommandContext, CommandError, CommandHandle, CommandResult, Goal, HandlerBindings,
};
use crate::runtime::result_cache::ResultCache;
use crate::runtime::state_machine::StateMachine;
use crate::safety::SafetyController;
use crate::state::RobotState;
use crate::util::ExecutionId;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Command-actor mailbox capacity.
    pub mailbox_capacity: usize,
    /// How long a cooperative cancel may take before the actor task is
    /// aborted and a synthetic cancelled result is cached.
    pub cancel_timeout: Duration,
    /// Result retention window for after-termination recovery.
    pub result_retention: Duration,
    /// Initial operational state.
    pub initial_state: Name,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            cancel_timeout: Duration::from_secs(5),
            result_retention: Duration::from_secs(30),
            initial_state: Name::new(botsys_model::STATE_DISARMED),
        }
    }
}

/// One entry of `executing()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutingCommand {
    /// Command name.
    pub name: Name,
    /// Category it occupies.
    pub category: Name,
    /// Execution token.
    pub execution_id: ExecutionId,
}

/// One entry of `category_availability()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryAvailability {
    /// Live commands in the category.
    pub current: usize,
    /// Declared limit.
    pub limit: usize,
}

struct LiveCommand {
    name: Name,
    category: Name,
    allowed_states: Vec<Name>,
    param_options: Vec<(Name, Path)>,
    handle: ActorHandle,
    cancel: watch::Sender<bool>,
    done: watch::Sender<bool>,
    started_at: Instant,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct EngineInner {
    description: Arc<RobotDescription>,
    registry: ProcessRegistry,
    pubsub: PubSubRouter,
    params: ParamRegistry,
    safety: SafetyController,
    robot_state: RobotState,
    handlers: HandlerBindings,
    config: EngineConfig,
    state_machine: Mutex<StateMachine>,
    categories: Mutex<CategoryTable>,
    live: DashMap<ExecutionId, Arc<LiveCommand>>,
    results: ResultCache,
    /// parameter path -> executions whose options are bound to it
    param_index: DashMap<Path, Vec<ExecutionId>>,
    param_pump: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap-to-clone engine reference.
#[derive(Clone)]
pub struct RuntimeEngine {
    inner: Arc<EngineInner>,
}

impl RuntimeEngine {
    /// Build the engine and start its parameter pump.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        description: Arc<RobotDescription>,
        registry: ProcessRegistry,
        pubsub: PubSubRouter,
        params: ParamRegistry,
        safety: SafetyController,
        robot_state: RobotState,
        handlers: HandlerBindings,
        config: EngineConfig,
    ) -> Result<Self, CommandError> {
        let state_machine =
            StateMachine::new(description.states().to_vec(), config.initial_state.clone())
                .map_err(|e| CommandError::Failed(e.to_string()))?;
        let categories = CategoryTable::new(description.categories());
        let results = ResultCache::new(Some(config.result_retention));

        let engine = Self {
            inner: Arc::new(EngineInner {
                description,
                registry,
                pubsub,
                params,
                safety,
                robot_state,
                handlers,
                config,
                state_machine: Mutex::new(state_machine),
                categories: Mutex::new(categories),
                live: DashMap::new(),
                results,
                param_index: DashMap::new(),
                param_pump: Mutex::new(None),
            }),
        };
        engine.start_param_pump();
        Ok(engine)
    }

    // ---- dispatch ------------------------------------------------------

    /// Execute a declared command with the given goal.
    pub async fn execute(&self, name: &Name, goal: Goal) -> Result<CommandHandle, CommandError> {
        let decl = self
            .inner
            .description
            .command(name)
            .cloned()
            .ok_or_else(|| CommandError::UnknownCommand(name.clone()))?;

        // State guard.
        {
            let machine = self.inner.state_machine.lock();
            if !decl.allowed_states.contains(machine.current()) {
                return Err(CommandError::StateNotAllowed {
                    command: decl.name.clone(),
                    current: machine.current().clone(),
                    allowed: decl.allowed_states.clone(),
                });
            }
        }

        let execution_id = ExecutionId::new();

        // Capacity check, preempting per the cancel scope when full.
        loop {
            enum Plan {
                Admitted,
                Reject,
                PreemptAll,
                Preempt(ExecutionId),
            }
            let plan = {
                let mut categories = self.inner.categories.lock();
                if categories.admit(&decl.category, execution_id) {
                    Plan::Admitted
                } else {
                    match &decl.cancel {
                        CancelScope::None => Plan::Reject,
                        // `all` cancels every running command, not just
                        // enough to free the target category.
                        CancelScope::All => Plan::PreemptAll,
                        CancelScope::Categories(names) => match self.pick_victim(names) {
                            Some(victim) => Plan::Preempt(victim),
                            None => Plan::Reject,
                        },
                    }
                }
            };
            match plan {
                Plan::Admitted => break,
                Plan::Reject => return Err(CommandError::CategoryFull(decl.category.clone())),
                Plan::PreemptAll => {
                    debug!(command = %decl.name, "preempting every running command");
                    self.cancel_all().await;
                }
                Plan::Preempt(victim) => {
                    debug!(command = %decl.name, %victim, "preempting for capacity");
                    self.cancel_execution(victim).await;
                }
            }
        }

        match self.spawn_command(execution_id, &decl, goal) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                // Give the admission back; nothing was spawned.
                self.inner
                    .categories
                    .lock()
                    .release(&decl.category, &execution_id);
                Err(err)
            }
        }
    }

    /// Oldest-first victim within the given categories, if any.
    fn pick_victim(&self, categories: &[Name]) -> Option<ExecutionId> {
        self.inner
            .live
            .iter()
            .filter(|entry| categories.contains(&entry.value().category))
            .min_by_key(|entry| entry.value().started_at)
            .map(|entry| *entry.key())
    }

    fn spawn_command(
        &self,
        execution_id: ExecutionId,
        decl: &botsys_model::CommandDecl,
        goal_input: Goal,
    ) -> Result<CommandHandle, CommandError> {
        // Validate the goal and apply declared defaults.
        let mut goal = decl
            .goal_schema
            .apply(&goal_input)
            .map_err(|failures| CommandError::InvalidGoal { failures })?;

        // Options bound to parameters take their value from the parameter
        // unless the caller supplied them explicitly.
        for (option, path) in &decl.param_options {
            if goal_input.contains_key(option) {
                continue;
            }
            match self.inner.params.get(path) {
                Ok(value) => {
                    if let Some(entry) = decl.goal_schema.get(option) {
                        if let Err(reason) = entry.validate(&value) {
                            warn!(%path, %option, %reason, "bound parameter rejected by goal schema");
                            continue;
                        }
                    }
                    goal.insert(option.clone(), value);
                }
                Err(err) => warn!(%path, %option, error = %err, "bound parameter unavailable"),
            }
        }

        let factory = self
            .inner
            .handlers
            .get(&decl.handler)
            .ok_or_else(|| CommandError::Failed(format!("no handler bound for '{}'", decl.handler)))?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let (sender, receiver) = mailbox(
            Some(self.inner.config.mailbox_capacity),
            OverflowPolicy::Block,
        );

        let actor_name = Name::new(format!("{}.{execution_id}", decl.name));
        let actor_handle = ActorHandle::new(actor_name.clone(), ActorKind::Command, sender);
        let registration = self
            .inner
            .registry
            .register(actor_name, actor_handle.clone())
            .map_err(|e| CommandError::Failed(e.to_string()))?;

        let ctx = CommandContext {
            execution_id,
            command: decl.name.clone(),
            description: Arc::clone(&self.inner.description),
            robot_state: self.inner.robot_state.clone(),
            params: self.inner.params.clone(),
            pubsub: self.inner.pubsub.clone(),
            registry: self.inner.registry.clone(),
            safety: self.inner.safety.clone(),
            engine: self.clone(),
        };

        let live = Arc::new(LiveCommand {
            name: decl.name.clone(),
            category: decl.category.clone(),
            allowed_states: decl.allowed_states.clone(),
            param_options: decl.param_options.clone(),
            handle: actor_handle,
            cancel: cancel_tx,
            done: done_tx,
            started_at: Instant::now(),
            task: Mutex::new(None),
        });
        self.inner.live.insert(execution_id, Arc::clone(&live));
        for (_, path) in &decl.param_options {
            self.inner
                .param_index
                .entry(path.clone())
                .or_default()
                .push(execution_id);
        }

        let handler = factory.create(goal);
        let safety_rx = self.inner.safety.subscribe_phases();
        let task = actor::spawn(
            self.clone(),
            ctx,
            handler,
            receiver,
            cancel_rx,
            safety_rx,
            registration,
        );
        *live.task.lock() = Some(task);

        info!(command = %decl.name, %execution_id, category = %decl.category, "command spawned");
        Ok(CommandHandle {
            execution_id,
            command: decl.name.clone(),
            category: decl.category.clone(),
            done: done_rx,
        })
    }

    // ---- completion and recovery --------------------------------------

    /// Record an execution's outcome and release its resources. Invoked by
    /// the actor task on exit and by forced cancellation; first caller
    /// wins.
    pub(crate) async fn finish(&self, execution_id: ExecutionId, outcome: CommandResult) {
        let Some((_, live)) = self.inner.live.remove(&execution_id) else {
            return;
        };
        self.inner
            .categories
            .lock()
            .release(&live.category, &execution_id);
        self.inner.param_index.retain(|_, executions| {
            executions.retain(|id| id != &execution_id);
            !executions.is_empty()
        });

        // Apply the result's state transition before waking awaiters:
        // callers observing the result must also observe the new state.
        let next_state = outcome
            .as_ref()
            .ok()
            .and_then(|value| value.next_state.clone());
        if let Some(target) = next_state {
            if let Err(err) = Box::pin(self.transition_internal(Some(execution_id), target)).await
            {
                warn!(command = %live.name, error = %err, "result next_state rejected");
            }
        }

        // Cache before signalling completion so every awaiter that wakes
        // on `done` finds the result.
        self.inner.results.insert(execution_id, outcome);
        let _ = live.done.send(true);
        debug!(command = %live.name, %execution_id, "command finished");
    }

    /// Block until the execution terminates (or `timeout` elapses) and
    /// return its result. Within the retention window every caller sees
    /// the same result; afterwards the outcome is gone.
    pub async fn await_result(
        &self,
        handle: &CommandHandle,
        timeout: Option<Duration>,
    ) -> CommandResult {
        if let Some(result) = self.inner.results.get(&handle.execution_id) {
            return result;
        }

        let mut done = handle.done_receiver();
        if !*done.borrow_and_update() {
            let wait = done.changed();
            match timeout {
                Some(window) => {
                    if tokio::time::timeout(window, wait).await.is_err() {
                        return Err(CommandError::Timeout);
                    }
                }
                None => {
                    // A dropped sender also means the execution is over.
                    let _ = wait.await;
                }
            }
        }

        self.inner
            .results
            .get(&handle.execution_id)
            .unwrap_or(Err(CommandError::Expired))
    }

    /// Like [`Self::await_result`], but `None` while still running after
    /// the timeout instead of an error.
    pub async fn yield_result(
        &self,
        handle: &CommandHandle,
        timeout: Option<Duration>,
    ) -> Option<CommandResult> {
        match self.await_result(handle, timeout).await {
            Err(CommandError::Timeout) => None,
            result => Some(result),
        }
    }

    // ---- cancellation --------------------------------------------------

    /// Cancel one execution and wait for its result extraction. Returns
    /// whether a live execution was found.
    pub async fn cancel_execution(&self, execution_id: ExecutionId) -> bool {
        let Some(live) = self
            .inner
            .live
            .get(&execution_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return false;
        };

        let _ = live.cancel.send(true);
        let mut done = live.done.subscribe();
        if *done.borrow_and_update() {
            return true;
        }
        let graceful = tokio::time::timeout(self.inner.config.cancel_timeout, done.changed())
            .await
            .is_ok();
        if !graceful {
            warn!(command = %live.name, %execution_id, "cancel timed out, aborting actor");
            if let Some(task) = live.task.lock().take() {
                task.abort();
            }
            // The aborted task never reached finish(); synthesise.
            self.finish(execution_id, Err(CommandError::Cancelled)).await;
        }
        true
    }

    /// Cancel by handle.
    pub async fn cancel(&self, handle: &CommandHandle) -> bool {
        self.cancel_execution(handle.execution_id).await
    }

    /// Cancel every running command.
    pub async fn cancel_all(&self) {
        let victims: Vec<ExecutionId> =
            self.inner.live.iter().map(|entry| *entry.key()).collect();
        for victim in victims {
            self.cancel_execution(victim).await;
        }
    }

    // ---- operational state ---------------------------------------------

    /// Current operational state.
    pub fn operational_state(&self) -> Name {
        self.inner.state_machine.lock().current().clone()
    }

    /// Legacy view: `executing` while an idle-state command runs.
    pub fn classic_state(&self) -> Name {
        let current = self.operational_state();
        if current == Name::new(botsys_model::STATE_IDLE) && !self.inner.live.is_empty() {
            Name::new("executing")
        } else {
            current
        }
    }

    /// Transition requested by a running command.
    pub(crate) async fn transition_from_command(
        &self,
        execution_id: ExecutionId,
        target: Name,
    ) -> Result<(), CommandError> {
        self.transition_internal(Some(execution_id), target).await
    }

    async fn transition_internal(
        &self,
        exclude: Option<ExecutionId>,
        target: Name,
    ) -> Result<(), CommandError> {
        let transition = {
            let mut machine = self.inner.state_machine.lock();
            machine
                .transition(target)
                .map_err(|e| CommandError::Failed(e.to_string()))?
        };
        info!(from = %transition.from, to = %transition.to, "operational state transition");

        let new_state = transition.to.clone();
        if let Ok(envelope) = Envelope::new("runtime", Payload::Transition(transition)) {
            self.inner
                .pubsub
                .publish(&Path::from(["state_machine"]), envelope);
        }

        // Preempt exactly the running commands whose allowed states
        // exclude the new state.
        let victims: Vec<ExecutionId> = self
            .inner
            .live
            .iter()
            .filter(|entry| Some(*entry.key()) != exclude)
            .filter(|entry| !entry.value().allowed_states.contains(&new_state))
            .map(|entry| *entry.key())
            .collect();
        for victim in victims {
            debug!(%victim, state = %new_state, "preempted by state transition");
            self.cancel_execution(victim).await;
        }
        Ok(())
    }

    // ---- introspection -------------------------------------------------

    /// Live commands.
    pub fn executing(&self) -> Vec<ExecutingCommand> {
        let mut out: Vec<(Instant, ExecutingCommand)> = self
            .inner
            .live
            .iter()
            .map(|entry| {
                (
                    entry.value().started_at,
                    ExecutingCommand {
                        name: entry.value().name.clone(),
                        category: entry.value().category.clone(),
                        execution_id: *entry.key(),
                    },
                )
            })
            .collect();
        out.sort_by_key(|(started, _)| *started);
        out.into_iter().map(|(_, command)| command).collect()
    }

    /// `(current, limit)` per category.
    pub fn category_availability(&self) -> HashMap<Name, CategoryAvailability> {
        self.inner
            .categories
            .lock()
            .availability()
            .into_iter()
            .map(|(name, (current, limit))| (name, CategoryAvailability { current, limit }))
            .collect()
    }

    /// The description the engine runs.
    pub fn description(&self) -> &Arc<RobotDescription> {
        &self.inner.description
    }

    // ---- parameter-driven options --------------------------------------

    /// Forward parameter changes to commands whose options are bound to
    /// the changed path.
    fn start_param_pump(&self) {
        let engine = self.clone();
        let mut subscription = self.inner.pubsub.subscribe(
            Path::from(["param"]),
            SubscribeOptions::new().with_message_types([PayloadKind::ParameterChanged]),
        );
        let pump = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                let Payload::ParameterChanged(change) = envelope.payload else {
                    continue;
                };
                engine.notify_bound_commands(&change.path);
            }
        });
        *self.inner.param_pump.lock() = Some(pump);
    }

    fn notify_bound_commands(&self, path: &Path) {
        let executions = self
            .inner
            .param_index
            .get(path)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for execution_id in executions {
            let Some(live) = self
                .inner
                .live
                .get(&execution_id)
                .map(|entry| Arc::clone(entry.value()))
            else {
                continue;
            };
            // Re-resolve every bound option to its current value.
            let mut options: Goal = Goal::new();
            for (option, bound_path) in &live.param_options {
                if let Ok(value) = self.inner.params.get(bound_path) {
                    options.insert(option.clone(), value);
                }
            }
            if live.handle.try_send(BusMsg::Options(options)).is_err() {
                debug!(command = %live.name, "options update dropped, actor gone");
            }
        }
    }

    // ---- shutdown ------------------------------------------------------

    /// Cancel everything and stop the parameter pump.
    pub async fn shutdown(&self) {
        self.cancel_all().await;
        if let Some(pump) = self.inner.param_pump.lock().take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for RuntimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEngine")
            .field("robot", self.inner.description.name())
            .field("live", &self.inner.live.len())
            .finish_non_exhaustive()
    }
}

/// A `Value` goal map helper used by generated call sites and tests.
pub fn goal<I, N>(entries: I) -> Goal
where
    I: IntoIterator<Item = (N, Value)>,
    N: Into<Name>,
{
    entries
        .into_iter()
        .map(|(name, value)| (name.into(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use botsys_model::{
        Category, CommandDecl, Joint, JointKind, JointLimits, Link, RobotBuilder, Schema,
        SchemaEntry, Transform, ValueType, Vec3, STATE_IDLE,
    };

    use crate::runtime::builtin::bind_builtins;
    use crate::runtime::command::{
        After, CommandHandler, CommandValue, Step, StopReason,
    };

    /// Test handler: waits for an explicit release cast, then completes
    /// with its goal's `result` value.
    struct WaitForRelease {
        goal: Goal,
    }

    #[async_trait]
    impl CommandHandler for WaitForRelease {
        async fn handle_command(&mut self, _ctx: &CommandContext) -> Result<Step, CommandError> {
            Ok(Step::Continue)
        }

        async fn handle_cast(
            &mut self,
            _envelope: Envelope,
            _ctx: &CommandContext,
        ) -> Result<Step, CommandError> {
            Ok(Step::Stop(StopReason::Done))
        }

        async fn handle_options(
            &mut self,
            options: Goal,
            _ctx: &CommandContext,
        ) -> Result<Step, CommandError> {
            // Completing on an option update makes the effect observable.
            self.goal.extend(options);
            Ok(Step::Stop(StopReason::Done))
        }

        async fn result(&mut self, _ctx: &CommandContext) -> CommandResult {
            let value = self
                .goal
                .get("result")
                .cloned()
                .unwrap_or(Value::Bool(true));
            Ok(CommandValue {
                value,
                next_state: None,
            })
        }
    }

    /// Test handler: completes immediately after a short timer.
    struct QuickDone;

    #[async_trait]
    impl CommandHandler for QuickDone {
        async fn handle_command(&mut self, _ctx: &CommandContext) -> Result<Step, CommandError> {
            Ok(Step::ContinueThen(After::Timeout(Duration::from_millis(5))))
        }

        async fn result(&mut self, _ctx: &CommandContext) -> CommandResult {
            Ok(CommandValue::ok("done"))
        }
    }

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
                .category(Category::new("motion", 1))
                .state("recording")
                .command(
                    CommandDecl::new("hold_position", "wait")
                        .in_category("motion")
                        .allowed_in([STATE_IDLE]),
                )
                .command(
                    CommandDecl::new("sweep", "wait")
                        .in_category("motion")
                        .allowed_in([STATE_IDLE])
                        .with_cancel(CancelScope::Categories(vec![Name::new("motion")])),
                )
                .command(
                    CommandDecl::new("halt", "wait")
                        .in_category("motion")
                        .allowed_in([STATE_IDLE])
                        .with_cancel(CancelScope::All),
                )
                .command(
                    CommandDecl::new("snapshot", "quick").allowed_in([STATE_IDLE, "recording"]),
                )
                .command(
                    CommandDecl::new("record", "wait").allowed_in([STATE_IDLE, "recording"]),
                )
                .command(
                    CommandDecl::new("tune", "wait")
                        .in_category("motion")
                        .allowed_in([STATE_IDLE])
                        .with_goal_schema(Schema::new().with(
                            "gain",
                            SchemaEntry::new(ValueType::Float)
                                .with_min(0.0)
                                .with_default(Value::Float(1.0)),
                        ))
                        .bind_option("gain", botsys_model::Path::from(["ctrl", "gain"])),
                )
                .build()
                .unwrap(),
        )
    }

    struct Fixture {
        engine: RuntimeEngine,
        registry: ProcessRegistry,
        pubsub: PubSubRouter,
        params: ParamRegistry,
    }

    fn fixture() -> Fixture {
        let description = description();
        let pubsub = PubSubRouter::new();
        let params = ParamRegistry::new(pubsub.clone());
        params
            .register(
                &Path::from(["ctrl"]),
                &Schema::new().with(
                    "gain",
                    SchemaEntry::new(ValueType::Float)
                        .with_min(0.0)
                        .with_default(Value::Float(2.0)),
                ),
            )
            .unwrap();
        let safety = SafetyController::new(pubsub.clone());
        let robot_state = RobotState::new(Arc::clone(&description), true);
        let registry = ProcessRegistry::new();

        let handlers = bind_builtins(HandlerBindings::new())
            .bind_fn("wait", |goal| Box::new(WaitForRelease { goal }))
            .bind_fn("quick", |_goal| Box::new(QuickDone));

        let engine = RuntimeEngine::new(
            description,
            registry.clone(),
            pubsub.clone(),
            params.clone(),
            safety,
            robot_state,
            handlers,
            EngineConfig {
                cancel_timeout: Duration::from_millis(500),
                ..EngineConfig::default()
            },
        )
        .unwrap();
        Fixture {
            engine,
            registry,
            pubsub,
            params,
        }
    }

    async fn arm(engine: &RuntimeEngine) {
        let handle = engine
            .execute(&Name::new("arm"), Goal::new())
            .await
            .unwrap();
        engine.await_result(&handle, None).await.unwrap();
    }

    fn release_envelope() -> Envelope {
        Envelope::new(
            "runtime",
            Payload::Diagnostic(crate::message::DiagnosticEvent::new(
                "test",
                crate::message::DiagnosticLevel::Ok,
                "release",
            )),
        )
        .unwrap()
    }

    async fn release(registry: &ProcessRegistry, handle: &CommandHandle) {
        let actor = registry
            .lookup(&Name::new(format!(
                "{}.{}",
                handle.command(),
                handle.execution_id()
            )))
            .unwrap();
        actor.cast(release_envelope()).await.unwrap();
    }

    #[tokio::test]
    async fn test_state_guard_rejects_while_disarmed() {
        let fixture = fixture();
        let err = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap_err();
        match err {
            CommandError::StateNotAllowed { current, allowed, .. } => {
                assert_eq!(current, Name::new("disarmed"));
                assert_eq!(allowed, vec![Name::new("idle")]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_category_full_without_cancel_scope() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let first = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();

        // Same category, no cancel scope: immediate rejection.
        let err = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::CategoryFull(_)));

        // The first command is unaffected.
        let availability = fixture.engine.category_availability();
        assert_eq!(availability[&Name::new("motion")].current, 1);

        release(&fixture.registry, &first).await;
        fixture.engine.await_result(&first, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_scope_preempts_oldest() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let first = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();

        // sweep's cancel scope covers the motion category: the running
        // command is preempted and the new one proceeds.
        let second = fixture
            .engine
            .execute(&Name::new("sweep"), Goal::new())
            .await
            .unwrap();

        let first_result = fixture.engine.await_result(&first, None).await;
        assert_eq!(first_result, Err(CommandError::Cancelled));

        release(&fixture.registry, &second).await;
        let second_result = fixture.engine.await_result(&second, None).await.unwrap();
        assert_eq!(second_result.value, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_cancel_scope_all_clears_every_category() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        // Fill two different categories.
        let hold = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();
        let record = fixture
            .engine
            .execute(&Name::new("record"), Goal::new())
            .await
            .unwrap();

        // halt's scope is `all`: both running commands are cancelled, the
        // record command included even though it occupies another category.
        let halt = fixture
            .engine
            .execute(&Name::new("halt"), Goal::new())
            .await
            .unwrap();

        assert_eq!(
            fixture.engine.await_result(&hold, None).await,
            Err(CommandError::Cancelled)
        );
        assert_eq!(
            fixture.engine.await_result(&record, None).await,
            Err(CommandError::Cancelled)
        );

        let executing = fixture.engine.executing();
        assert_eq!(executing.len(), 1);
        assert_eq!(executing[0].name, Name::new("halt"));

        release(&fixture.registry, &halt).await;
        fixture.engine.await_result(&halt, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_category_cap_never_exceeded() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let _first = fixture
            .engine
            .execute(&Name::new("sweep"), Goal::new())
            .await
            .unwrap();
        let _second = fixture
            .engine
            .execute(&Name::new("sweep"), Goal::new())
            .await
            .unwrap();

        let availability = fixture.engine.category_availability();
        let motion = availability[&Name::new("motion")];
        assert!(motion.current <= motion.limit);
        assert_eq!(motion.limit, 1);
    }

    #[tokio::test]
    async fn test_invalid_goal_releases_admission() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let err = fixture
            .engine
            .execute(
                &Name::new("tune"),
                goal([("gain", Value::Float(-3.0))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidGoal { .. }));

        // The failed dispatch must not leak category capacity.
        let availability = fixture.engine.category_availability();
        assert_eq!(availability[&Name::new("motion")].current, 0);
    }

    #[tokio::test]
    async fn test_await_timeout_and_yield_none() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let handle = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();

        let err = fixture
            .engine
            .await_result(&handle, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::Timeout);

        assert!(fixture
            .engine
            .yield_result(&handle, Some(Duration::from_millis(20)))
            .await
            .is_none());

        release(&fixture.registry, &handle).await;
        assert!(fixture
            .engine
            .yield_result(&handle, None)
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_awaiters_see_same_result() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let handle = fixture
            .engine
            .execute(&Name::new("snapshot"), Goal::new())
            .await
            .unwrap();

        let engine_a = fixture.engine.clone();
        let engine_b = fixture.engine.clone();
        let handle_a = handle.clone();
        let handle_b = handle.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { engine_a.await_result(&handle_a, None).await }),
            tokio::spawn(async move { engine_b.await_result(&handle_b, None).await }),
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value, Value::Str("done".into()));
    }

    #[tokio::test]
    async fn test_result_expires_after_retention() {
        let fixture = fixture();
        let description = fixture.engine.description().clone();
        let engine = RuntimeEngine::new(
            description,
            ProcessRegistry::new(),
            fixture.pubsub.clone(),
            fixture.params.clone(),
            SafetyController::new(fixture.pubsub.clone()),
            RobotState::new(fixture.engine.description().clone(), true),
            bind_builtins(HandlerBindings::new()).bind_fn("quick", |_| Box::new(QuickDone)),
            EngineConfig {
                result_retention: Duration::from_millis(10),
                ..EngineConfig::default()
            },
        )
        .unwrap();
        arm(&engine).await;

        let handle = engine
            .execute(&Name::new("snapshot"), Goal::new())
            .await
            .unwrap();
        engine.await_result(&handle, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let err = engine.await_result(&handle, None).await.unwrap_err();
        assert_eq!(err, CommandError::Expired);
    }

    #[tokio::test]
    async fn test_transition_preempts_exactly_invalidated_commands() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        // `record` survives in `recording`; `hold_position` does not.
        let record = fixture
            .engine
            .execute(&Name::new("record"), Goal::new())
            .await
            .unwrap();
        let hold = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();

        fixture
            .engine
            .transition_internal(None, Name::new("recording"))
            .await
            .unwrap();

        // hold_position was cancelled, record keeps running.
        let hold_result = fixture.engine.await_result(&hold, None).await;
        assert_eq!(hold_result, Err(CommandError::Cancelled));

        let executing = fixture.engine.executing();
        assert_eq!(executing.len(), 1);
        assert_eq!(executing[0].name, Name::new("record"));

        release(&fixture.registry, &record).await;
        fixture.engine.await_result(&record, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_transition_publishes_event() {
        let fixture = fixture();
        let mut sub = fixture.pubsub.subscribe(
            Path::from(["state_machine"]),
            SubscribeOptions::new().with_message_types([PayloadKind::Transition]),
        );
        arm(&fixture.engine).await;

        match sub.recv().await.unwrap().payload {
            Payload::Transition(transition) => {
                assert_eq!(transition.from, Name::new("disarmed"));
                assert_eq!(transition.to, Name::new("idle"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classic_state() {
        let fixture = fixture();
        assert_eq!(fixture.engine.classic_state(), Name::new("disarmed"));
        arm(&fixture.engine).await;
        assert_eq!(fixture.engine.classic_state(), Name::new("idle"));

        let handle = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();
        assert_eq!(fixture.engine.classic_state(), Name::new("executing"));

        release(&fixture.registry, &handle).await;
        fixture.engine.await_result(&handle, None).await.unwrap();
        assert_eq!(fixture.engine.classic_state(), Name::new("idle"));
    }

    #[tokio::test]
    async fn test_bound_option_resolved_and_updated() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        // Dispatch without supplying `gain`: the bound parameter (2.0)
        // overrides the schema default (1.0).
        let handle = fixture
            .engine
            .execute(&Name::new("tune"), Goal::new())
            .await
            .unwrap();

        // Changing the bound parameter re-invokes handle_options; the test
        // handler completes and folds the update into its result.
        fixture
            .params
            .set(&Path::from(["ctrl", "gain"]), Value::Float(5.0))
            .unwrap();

        let result = fixture.engine.await_result(&handle, None).await.unwrap();
        assert_eq!(result.value, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_cancel_by_handle() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let handle = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();
        assert!(fixture.engine.cancel(&handle).await);

        let result = fixture.engine.await_result(&handle, None).await;
        assert_eq!(result, Err(CommandError::Cancelled));
        assert!(fixture.engine.executing().is_empty());

        // Cancelling again finds nothing live.
        assert!(!fixture.engine.cancel(&handle).await);
    }

    #[tokio::test]
    async fn test_registry_binding_per_execution() {
        let fixture = fixture();
        arm(&fixture.engine).await;

        let handle = fixture
            .engine
            .execute(&Name::new("hold_position"), Goal::new())
            .await
            .unwrap();
        let actor_name = Name::new(format!(
            "{}.{}",
            handle.command(),
            handle.execution_id()
        ));
        assert!(fixture.registry.lookup(&actor_name).is_some());

        fixture.engine.cancel(&handle).await;
        // Binding disappears with the actor task.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fixture.registry.lookup(&actor_name).is_none());
    }
}
