//! The robot facade: start, drive, and stop one robot.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use tracing::info;

// Layer 3: Internal module imports
use botsys_model::{Name, RobotDescription};

use crate::device::ActuatorApi;
use crate::error::RuntimeError;
use crate::param::{ParamRegistry, ParamStore};
use crate::pubsub::PubSubRouter;
use crate::registry::ProcessRegistry;
use crate::runtime::builtin::bind_builtins;
use crate::runtime::{
    CategoryAvailability, CommandError, CommandHandle, CommandResult, EngineConfig,
    ExecutingCommand, Goal, HandlerBindings, RuntimeEngine,
};
use crate::safety::SafetyController;
use crate::state::RobotState;
use crate::supervision::tree::spawn_tree;
use crate::supervision::{
    DeviceBindings, SimulationMode, SupervisorConfig, SupervisorHandle, TreeContext,
};

/// Start-time options.
///
/// # Example
/// ```rust,ignore
/// let options = RobotOptions::new()
///     .simulation(SimulationMode::Kinematic)
///     .parameter_store(Box::new(FileParamStore::open("/var/lib/robot/params.json")?))
///     .auto_disarm_on_error(true);
/// let robot = Robot::start(description, handlers, devices, options).await?;
/// ```
pub struct RobotOptions {
    /// Substitution mode for actuators/controllers/bridges.
    pub simulation: SimulationMode,
    /// Durable parameter backend; `None` keeps parameters in memory only.
    pub parameter_store: Option<Box<dyn ParamStore>>,
    /// Disarm automatically when a device reports a hardware fault.
    pub auto_disarm_on_error: bool,
    /// Operational state the machine starts in.
    pub initial_state: Name,
    /// Enforce joint limits on robot-state writes.
    pub respect_limits: bool,
    /// Command-actor mailbox capacity.
    pub mailbox_capacity: usize,
    /// Bound on cooperative command cancellation.
    pub cancel_timeout: Duration,
    /// Result retention window for late awaiters.
    pub result_retention: Duration,
    /// Restart budget at every supervisor level.
    pub supervisor_config: SupervisorConfig,
}

impl Default for RobotOptions {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            simulation: SimulationMode::None,
            parameter_store: None,
            auto_disarm_on_error: false,
            initial_state: engine.initial_state,
            respect_limits: true,
            mailbox_capacity: engine.mailbox_capacity,
            cancel_timeout: engine.cancel_timeout,
            result_retention: engine.result_retention,
            supervisor_config: SupervisorConfig::default(),
        }
    }
}

impl RobotOptions {
    /// Defaults: no simulation, no store, limits enforced, `disarmed`
    /// initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: substitution mode.
    pub fn simulation(mut self, simulation: SimulationMode) -> Self {
        self.simulation = simulation;
        self
    }

    /// Builder: durable parameter backend.
    pub fn parameter_store(mut self, store: Box<dyn ParamStore>) -> Self {
        self.parameter_store = Some(store);
        self
    }

    /// Builder: disarm on device hardware faults.
    pub fn auto_disarm_on_error(mut self, enabled: bool) -> Self {
        self.auto_disarm_on_error = enabled;
        self
    }

    /// Builder: initial operational state.
    pub fn initial_state(mut self, state: impl Into<Name>) -> Self {
        self.initial_state = state.into();
        self
    }

    /// Builder: result retention window.
    pub fn result_retention(mut self, window: Duration) -> Self {
        self.result_retention = window;
        self
    }

    /// Builder: cancellation bound.
    pub fn cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }
}

/// One running robot.
///
/// Owns the shared services and the root supervisor. Dropping the robot
/// without `stop` aborts nothing gracefully; call [`Robot::stop`] for an
/// orderly shutdown with the safety cascade.
pub struct Robot {
    description: Arc<RobotDescription>,
    registry: ProcessRegistry,
    pubsub: PubSubRouter,
    params: ParamRegistry,
    safety: SafetyController,
    robot_state: RobotState,
    engine: RuntimeEngine,
    actuators: ActuatorApi,
    root: Option<SupervisorHandle>,
}

impl Robot {
    /// Build every service, register parameters, load persisted values,
    /// and spawn the topology-mirroring supervision tree.
    pub async fn start(
        description: Arc<RobotDescription>,
        handlers: HandlerBindings,
        devices: DeviceBindings,
        options: RobotOptions,
    ) -> Result<Self, RuntimeError> {
        let pubsub = PubSubRouter::new();
        let params = ParamRegistry::with_store(pubsub.clone(), options.parameter_store);
        for (component, schema) in description.parameters() {
            params
                .register(component, schema)
                .map_err(|e| RuntimeError::invalid(e.to_string()))?;
        }
        params
            .load_persisted()
            .map_err(|e| RuntimeError::invalid(e.to_string()))?;

        let safety = SafetyController::new(pubsub.clone());
        let robot_state = RobotState::new(Arc::clone(&description), options.respect_limits);
        let registry = ProcessRegistry::new();

        let engine = RuntimeEngine::new(
            Arc::clone(&description),
            registry.clone(),
            pubsub.clone(),
            params.clone(),
            safety.clone(),
            robot_state.clone(),
            bind_builtins(handlers),
            EngineConfig {
                mailbox_capacity: options.mailbox_capacity,
                cancel_timeout: options.cancel_timeout,
                result_retention: options.result_retention,
                initial_state: options.initial_state.clone(),
            },
        )
        .map_err(|e| RuntimeError::invalid(e.to_string()))?;

        let tree = Arc::new(TreeContext {
            description: Arc::clone(&description),
            registry: registry.clone(),
            pubsub: pubsub.clone(),
            params: params.clone(),
            safety: safety.clone(),
            robot_state: robot_state.clone(),
            bindings: devices,
            simulation: options.simulation,
            auto_disarm_on_error: options.auto_disarm_on_error,
            supervisor_config: options.supervisor_config.clone(),
        });
        let root = match spawn_tree(tree).await {
            Ok(root) => root,
            Err(err) => {
                engine.shutdown().await;
                return Err(err);
            }
        };

        info!(robot = %description.name(), "robot started");
        Ok(Self {
            actuators: ActuatorApi::new(registry.clone(), pubsub.clone(), Arc::clone(&description)),
            description,
            registry,
            pubsub,
            params,
            safety,
            robot_state,
            engine,
            root: Some(root),
        })
    }

    /// Orderly shutdown: cancel commands, stop the tree, then run the
    /// safety cascade so every registered disarm callback fires.
    pub async fn stop(mut self) -> Result<(), RuntimeError> {
        self.engine.shutdown().await;
        let tree_result = match self.root.take() {
            Some(root) => root.stop().await,
            None => Ok(()),
        };
        // Shutdown always disarms registered hardware, even when the tree
        // went down abnormally; a callback failure latches the error state
        // for inspection but shutdown proceeds.
        let _ = self.safety.disarm().await;
        info!(robot = %self.description.name(), "robot stopped");
        tree_result
    }

    // ---- command API ---------------------------------------------------

    /// Execute a declared command.
    pub async fn execute(
        &self,
        command: impl Into<Name>,
        goal: Goal,
    ) -> Result<CommandHandle, CommandError> {
        self.engine.execute(&command.into(), goal).await
    }

    /// Block until the command terminates (bounded by `timeout`).
    pub async fn await_result(
        &self,
        handle: &CommandHandle,
        timeout: Option<Duration>,
    ) -> CommandResult {
        self.engine.await_result(handle, timeout).await
    }

    /// Like `await_result`, but `None` while still running.
    pub async fn yield_result(
        &self,
        handle: &CommandHandle,
        timeout: Option<Duration>,
    ) -> Option<CommandResult> {
        self.engine.yield_result(handle, timeout).await
    }

    /// Cancel one execution.
    pub async fn cancel(&self, handle: &CommandHandle) -> bool {
        self.engine.cancel(handle).await
    }

    /// Cancel every running command.
    pub async fn cancel_all(&self) {
        self.engine.cancel_all().await
    }

    /// Current operational state.
    pub fn operational_state(&self) -> Name {
        self.engine.operational_state()
    }

    /// Legacy view: `executing` while an idle-state command runs.
    pub fn classic_state(&self) -> Name {
        self.engine.classic_state()
    }

    /// Live commands.
    pub fn executing(&self) -> Vec<ExecutingCommand> {
        self.engine.executing()
    }

    /// `(current, limit)` per category.
    pub fn category_availability(
        &self,
    ) -> std::collections::HashMap<Name, CategoryAvailability> {
        self.engine.category_availability()
    }

    // ---- shared services ----------------------------------------------

    /// The immutable description.
    pub fn description(&self) -> &Arc<RobotDescription> {
        &self.description
    }

    /// Name-to-actor resolution.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// The fabric.
    pub fn pubsub(&self) -> &PubSubRouter {
        &self.pubsub
    }

    /// The parameter registry.
    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    /// The safety controller.
    pub fn safety(&self) -> &SafetyController {
        &self.safety
    }

    /// Whether the safety latch is armed.
    pub fn armed(&self) -> bool {
        self.safety.armed()
    }

    /// Whether the safety latch is in error.
    pub fn in_error(&self) -> bool {
        self.safety.in_error()
    }

    /// Joint-state reads.
    pub fn robot_state(&self) -> &RobotState {
        &self.robot_state
    }

    /// The three-mode actuator command API.
    pub fn actuators(&self) -> &ActuatorApi {
        &self.actuators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use botsys_model::{
        CancelScope, Category, CommandDecl, Joint, JointKind, JointLimits, Link, Path,
        RobotBuilder, Schema, SchemaEntry, Value, ValueType, STATE_IDLE,
    };

    use crate::message::{
        ImuReading, Payload, PayloadKind,
    };
    use crate::pubsub::SubscribeOptions;
    use crate::runtime::{After, CommandContext, CommandHandler, CommandValue, Step, StopReason};
    use botsys_model::{Quaternion, Vec3};

    /// Moves a joint after a short simulated motion delay.
    struct MoveHandler {
        goal: Goal,
    }

    #[async_trait]
    impl CommandHandler for MoveHandler {
        async fn handle_command(&mut self, _ctx: &CommandContext) -> Result<Step, CommandError> {
            let hold_ms = self
                .goal
                .get("hold_ms")
                .and_then(Value::as_f64)
                .unwrap_or(10.0);
            Ok(Step::ContinueThen(After::Timeout(Duration::from_millis(
                hold_ms as u64,
            ))))
        }

        async fn handle_timeout(&mut self, ctx: &CommandContext) -> Result<Step, CommandError> {
            let joint = self
                .goal
                .get("joint")
                .and_then(Value::as_str)
                .map(Name::new)
                .ok_or_else(|| CommandError::Failed("goal missing joint".to_string()))?;
            let position = self
                .goal
                .get("position")
                .and_then(Value::as_f64)
                .ok_or_else(|| CommandError::Failed("goal missing position".to_string()))?;
            ctx.set_joint_position(&joint, position)
                .map_err(|e| CommandError::Failed(e.to_string()))?;
            Ok(Step::Stop(StopReason::Done))
        }

        async fn result(&mut self, _ctx: &CommandContext) -> CommandResult {
            let position = self.goal.get("position").cloned().unwrap_or(Value::Bool(true));
            Ok(CommandValue {
                value: position,
                next_state: None,
            })
        }
    }

    fn pan_tilt() -> Arc<RobotDescription> {
        let move_schema = Schema::new()
            .with("joint", SchemaEntry::new(ValueType::Str))
            .with(
                "position",
                SchemaEntry::new(ValueType::Float)
                    .with_min(-std::f64::consts::PI)
                    .with_max(std::f64::consts::PI),
            )
            .with(
                "hold_ms",
                SchemaEntry::new(ValueType::Float)
                    .with_min(0.0)
                    .with_default(Value::Float(10.0)),
            );

        Arc::new(
            RobotBuilder::new("pan_tilt")
                .link(Link::new("base"))
                .link(Link::new("pan_link"))
                .link(Link::new("cam"))
                .joint(Joint {
                    name: "pan".into(),
                    kind: JointKind::Revolute,
                    parent_link: "base".into(),
                    child_link: "pan_link".into(),
                    axis: Vec3::new(0.0, 0.0, 1.0),
                    origin: botsys_model::Transform::identity(),
                    limits: Some(JointLimits::symmetric(
                        std::f64::consts::FRAC_PI_2,
                        10.0,
                        2.0,
                    )),
                })
                .joint(Joint {
                    name: "tilt".into(),
                    kind: JointKind::Revolute,
                    parent_link: "pan_link".into(),
                    child_link: "cam".into(),
                    axis: Vec3::new(0.0, 1.0, 0.0),
                    origin: botsys_model::Transform::identity(),
                    limits: Some(JointLimits {
                        lower: -std::f64::consts::FRAC_PI_4,
                        upper: std::f64::consts::FRAC_PI_2,
                        effort: 10.0,
                        velocity: 2.0,
                    }),
                })
                .category(Category::new("motion", 1))
                .command(
                    CommandDecl::new("move", "move")
                        .allowed_in([STATE_IDLE])
                        .in_category("motion")
                        .with_goal_schema(move_schema.clone()),
                )
                .command(
                    CommandDecl::new("move_preempting", "move")
                        .allowed_in([STATE_IDLE])
                        .in_category("motion")
                        .with_cancel(CancelScope::Categories(vec![Name::new("motion")]))
                        .with_goal_schema(move_schema),
                )
                .parameters(
                    Path::from(["pid"]),
                    Schema::new()
                        .with(
                            "kp",
                            SchemaEntry::new(ValueType::Float).with_default(Value::Float(1.0)),
                        )
                        .with(
                            "ki",
                            SchemaEntry::new(ValueType::Float)
                                .with_min(0.0)
                                .with_default(Value::Float(0.0)),
                        ),
                )
                .build()
                .unwrap(),
        )
    }

    fn handlers() -> HandlerBindings {
        HandlerBindings::new().bind_fn("move", |goal| Box::new(MoveHandler { goal }))
    }

    async fn start_robot() -> Robot {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Robot::start(
            pan_tilt(),
            handlers(),
            DeviceBindings::new(),
            RobotOptions::new().simulation(SimulationMode::Kinematic),
        )
        .await
        .unwrap()
    }

    async fn arm(robot: &Robot) {
        let handle = robot.execute("arm", Goal::new()).await.unwrap();
        robot.await_result(&handle, None).await.unwrap();
    }

    fn move_goal(joint: &str, position: f64, hold_ms: f64) -> Goal {
        crate::runtime::engine::goal([
            ("joint", Value::Str(joint.to_string())),
            ("position", Value::Float(position)),
            ("hold_ms", Value::Float(hold_ms)),
        ])
    }

    #[tokio::test]
    async fn test_start_registers_topology_names() {
        // S1: fresh robot is disarmed, unarmed, and the topology names
        // resolve in the registry.
        let robot = start_robot().await;

        assert_eq!(robot.operational_state(), Name::new("disarmed"));
        assert!(!robot.armed());

        // Supervisors register lazily as the tree comes up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        for name in ["base", "pan", "pan_link", "tilt", "cam"] {
            assert!(
                robot.registry().contains(&Name::new(name)),
                "registry is missing '{name}'"
            );
        }

        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_arm_command_reaches_idle() {
        // S2: arm succeeds from disarmed and lands in idle.
        let robot = start_robot().await;

        let handle = robot.execute("arm", Goal::new()).await.unwrap();
        let result = robot.await_result(&handle, None).await.unwrap();

        assert_eq!(result.value, Value::Str("armed".into()));
        assert_eq!(result.next_state, Some(Name::new("idle")));
        assert_eq!(robot.operational_state(), Name::new("idle"));
        assert!(robot.armed());

        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_move_updates_robot_state() {
        // S3: a move command returns to idle and wrote the joint position.
        let robot = start_robot().await;
        arm(&robot).await;

        let handle = robot
            .execute("move", move_goal("pan", 0.5, 5.0))
            .await
            .unwrap();
        let result = robot.await_result(&handle, None).await.unwrap();

        assert_eq!(result.value, Value::Float(0.5));
        assert_eq!(robot.operational_state(), Name::new("idle"));
        assert_eq!(robot.robot_state().position(&Name::new("pan")), Some(0.5));

        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_preempting_move_cancels_running_one() {
        // S4: a move with a motion cancel scope preempts the running
        // motion command; the new command completes.
        let robot = start_robot().await;
        arm(&robot).await;

        let slow = robot
            .execute("move", move_goal("pan", 0.3, 500.0))
            .await
            .unwrap();
        let fast = robot
            .execute("move_preempting", move_goal("pan", 1.0, 5.0))
            .await
            .unwrap();

        let slow_result = robot.await_result(&slow, None).await;
        assert_eq!(slow_result, Err(CommandError::Cancelled));

        let fast_result = robot.await_result(&fast, None).await.unwrap();
        assert_eq!(fast_result.value, Value::Float(1.0));
        assert_eq!(robot.robot_state().position(&Name::new("pan")), Some(1.0));

        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_many_is_atomic() {
        // S5: a batch with one invalid entry changes nothing.
        let robot = start_robot().await;

        let err = robot
            .params()
            .set_many(vec![
                (Path::from(["pid", "kp"]), Value::Float(2.0)),
                (Path::from(["pid", "ki"]), Value::Float(-1.0)),
            ])
            .unwrap_err();
        match err {
            crate::param::ParamError::Validation { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, Path::from(["pid", "ki"]));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(
            robot.params().get(&Path::from(["pid", "kp"])).unwrap(),
            Value::Float(1.0)
        );

        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_imu_broadcast_single_delivery() {
        // S6: one subscription on [sensor], one publish, one delivery.
        let robot = start_robot().await;
        let mut sub = robot.pubsub().subscribe(
            Path::from(["sensor"]),
            SubscribeOptions::new().with_message_types([PayloadKind::Imu]),
        );

        let envelope = crate::message::Envelope::new(
            "base",
            Payload::Imu(ImuReading {
                orientation: Quaternion::identity(),
                angular_velocity: Vec3::zero(),
                linear_acceleration: Vec3::new(0.0, 0.0, 9.81),
            }),
        )
        .unwrap();
        robot
            .pubsub()
            .publish(&Path::from(["sensor", "base", "imu"]), envelope);

        let received = sub.recv().await.unwrap();
        match received.payload {
            Payload::Imu(imu) => {
                assert_eq!(imu.orientation, Quaternion::identity());
                assert_eq!(imu.linear_acceleration, Vec3::new(0.0, 0.0, 9.81));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(sub.try_recv().is_none());

        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_runs_disarm_callbacks() {
        // S7: stopping the robot invokes every registered callback once.
        use std::sync::atomic::{AtomicUsize, Ordering};

        let robot = start_robot().await;
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        robot.safety().register(
            Name::new("gripper"),
            Arc::new(move |_opts: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), RuntimeError>(())
                }
            }),
            Value::Bool(true),
        );

        arm(&robot).await;
        assert!(robot.armed());

        let safety = robot.safety().clone();
        robot.stop().await.unwrap();

        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert!(!safety.armed());
        assert!(!safety.in_error());
    }

    #[tokio::test]
    async fn test_classic_state_reports_executing() {
        let robot = start_robot().await;
        arm(&robot).await;

        let handle = robot
            .execute("move", move_goal("pan", 0.2, 200.0))
            .await
            .unwrap();
        assert_eq!(robot.classic_state(), Name::new("executing"));
        assert_eq!(robot.executing().len(), 1);

        robot.await_result(&handle, None).await.unwrap();
        assert_eq!(robot.classic_state(), Name::new("idle"));

        robot.stop().await.unwrap();
    }
}
