//! Builds the topology-mirroring process graph.
//!
//! The tree mirrors the physical robot: a root supervisor holds the
//! sensor/controller/bridge group supervisors and the root link's
//! supervisor; each link supervisor holds that link's sensors and one
//! supervisor per joint; each joint supervisor holds the joint's sensors,
//! its actuators, and the child link's supervisor, recursively. A
//! flapping device only consumes its own subtree's restart budget, and a
//! subtree that exhausts its budget escalates one level up while sibling
//! branches keep running.
//!
//! Shared-state services (registry, pub/sub, parameters, safety latch,
//! robot state, the command engine) are passive `Arc` values owned by the
//! robot handle rather than supervised tasks: they have no execution to
//! crash, so supervision applies to the actors that use them.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use futures::FutureExt;
use tokio::sync::watch;
use tracing::debug;

// Layer 3: Internal module imports
use botsys_model::{
    ActuatorDecl, Mount, Name, Options, Path, RobotDescription, SensorDecl, SimulationPolicy,
};

use crate::actor::{ActorHandle, ActorKind, BusMsg};
use crate::bridge::{spawn_bridge, Bridge};
use crate::device::actuator::{spawn_actuator, ActuatorDriver};
use crate::device::controller::{spawn_controller, ControllerDriver};
use crate::device::mock::MockActuator;
use crate::device::sensor::{spawn_sensor, SensorDriver};
use crate::device::DeviceContext;
use crate::error::RuntimeError;
use crate::mailbox::{mailbox, OverflowPolicy};
use crate::param::ParamRegistry;
use crate::pubsub::PubSubRouter;
use crate::registry::{ProcessRegistry, RegistrationGuard};
use crate::safety::SafetyController;
use crate::state::RobotState;
use crate::supervision::supervisor::{
    ChildSpec, RestartPolicy, RunningChild, Supervisor, SupervisorConfig, SupervisorHandle,
};

/// Runtime substitution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    /// Run real drivers.
    #[default]
    None,
    /// Replace actuators with deterministic mocks and honour each
    /// controller's and bridge's simulation policy.
    Kinematic,
}

/// Builds sensor drivers from validated options.
pub trait SensorFactory: Send + Sync + 'static {
    /// Build a driver.
    fn create(&self, options: &Options) -> Result<Box<dyn SensorDriver>, RuntimeError>;
}

impl<F> SensorFactory for F
where
    F: Fn(&Options) -> Result<Box<dyn SensorDriver>, RuntimeError> + Send + Sync + 'static,
{
    fn create(&self, options: &Options) -> Result<Box<dyn SensorDriver>, RuntimeError> {
        self(options)
    }
}

/// Builds actuator drivers from validated options.
pub trait ActuatorFactory: Send + Sync + 'static {
    /// Build a driver.
    fn create(&self, options: &Options) -> Result<Box<dyn ActuatorDriver>, RuntimeError>;
}

impl<F> ActuatorFactory for F
where
    F: Fn(&Options) -> Result<Box<dyn ActuatorDriver>, RuntimeError> + Send + Sync + 'static,
{
    fn create(&self, options: &Options) -> Result<Box<dyn ActuatorDriver>, RuntimeError> {
        self(options)
    }
}

/// Builds controller drivers; receives the simulation mode so a factory
/// can hand out a mock when its declaration says so.
pub trait ControllerFactory: Send + Sync + 'static {
    /// Build a driver.
    fn create(
        &self,
        options: &Options,
        mode: SimulationMode,
    ) -> Result<Box<dyn ControllerDriver>, RuntimeError>;
}

impl<F> ControllerFactory for F
where
    F: Fn(&Options, SimulationMode) -> Result<Box<dyn ControllerDriver>, RuntimeError>
        + Send
        + Sync
        + 'static,
{
    fn create(
        &self,
        options: &Options,
        mode: SimulationMode,
    ) -> Result<Box<dyn ControllerDriver>, RuntimeError> {
        self(options, mode)
    }
}

/// Builds bridge connectors.
///
/// The device context is passed in so a bridge can capture the local
/// pub/sub and republish subscribed remote updates on it.
pub trait BridgeFactory: Send + Sync + 'static {
    /// Build a connector.
    fn create(
        &self,
        options: &Options,
        mode: SimulationMode,
        ctx: &DeviceContext,
    ) -> Result<Arc<dyn Bridge>, RuntimeError>;
}

impl<F> BridgeFactory for F
where
    F: Fn(&Options, SimulationMode, &DeviceContext) -> Result<Arc<dyn Bridge>, RuntimeError>
        + Send
        + Sync
        + 'static,
{
    fn create(
        &self,
        options: &Options,
        mode: SimulationMode,
        ctx: &DeviceContext,
    ) -> Result<Arc<dyn Bridge>, RuntimeError> {
        self(options, mode, ctx)
    }
}

/// Driver implementations keyed by each declaration's driver name.
#[derive(Default, Clone)]
pub struct DeviceBindings {
    sensors: BTreeMap<Name, Arc<dyn SensorFactory>>,
    actuators: BTreeMap<Name, Arc<dyn ActuatorFactory>>,
    controllers: BTreeMap<Name, Arc<dyn ControllerFactory>>,
    bridges: BTreeMap<Name, Arc<dyn BridgeFactory>>,
}

impl DeviceBindings {
    /// Empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a sensor driver key.
    pub fn sensor(mut self, driver: impl Into<Name>, factory: Arc<dyn SensorFactory>) -> Self {
        self.sensors.insert(driver.into(), factory);
        self
    }

    /// Bind a sensor driver key with a closure.
    pub fn sensor_fn<F>(self, driver: impl Into<Name>, factory: F) -> Self
    where
        F: Fn(&Options) -> Result<Box<dyn SensorDriver>, RuntimeError> + Send + Sync + 'static,
    {
        self.sensor(driver, Arc::new(factory))
    }

    /// Bind an actuator driver key.
    pub fn actuator(mut self, driver: impl Into<Name>, factory: Arc<dyn ActuatorFactory>) -> Self {
        self.actuators.insert(driver.into(), factory);
        self
    }

    /// Bind an actuator driver key with a closure.
    pub fn actuator_fn<F>(self, driver: impl Into<Name>, factory: F) -> Self
    where
        F: Fn(&Options) -> Result<Box<dyn ActuatorDriver>, RuntimeError> + Send + Sync + 'static,
    {
        self.actuator(driver, Arc::new(factory))
    }

    /// Bind a controller driver key.
    pub fn controller(
        mut self,
        driver: impl Into<Name>,
        factory: Arc<dyn ControllerFactory>,
    ) -> Self {
        self.controllers.insert(driver.into(), factory);
        self
    }

    /// Bind a bridge driver key.
    pub fn bridge(mut self, driver: impl Into<Name>, factory: Arc<dyn BridgeFactory>) -> Self {
        self.bridges.insert(driver.into(), factory);
        self
    }
}

/// Everything the tree builder threads through the specs.
pub struct TreeContext {
    /// The immutable description.
    pub description: Arc<RobotDescription>,
    /// Unique-keyspace registry.
    pub registry: ProcessRegistry,
    /// The fabric.
    pub pubsub: PubSubRouter,
    /// Parameter registry.
    pub params: ParamRegistry,
    /// Safety controller.
    pub safety: SafetyController,
    /// Joint-state table.
    pub robot_state: RobotState,
    /// Driver bindings.
    pub bindings: DeviceBindings,
    /// Substitution mode.
    pub simulation: SimulationMode,
    /// Auto-disarm on device hardware faults.
    pub auto_disarm_on_error: bool,
    /// Restart budget applied at every supervisor level.
    pub supervisor_config: SupervisorConfig,
}

/// Spawn the whole tree; the returned handle is the root supervisor.
pub(crate) async fn spawn_tree(ctx: Arc<TreeContext>) -> Result<SupervisorHandle, RuntimeError> {
    let mut children = Vec::new();

    children.push(sensor_group_spec(Arc::clone(&ctx)));
    children.push(controller_group_spec(Arc::clone(&ctx)));
    children.push(bridge_group_spec(Arc::clone(&ctx)));
    children.push(link_spec(
        Arc::clone(&ctx),
        ctx.description.topology().root().clone(),
    ));

    Supervisor::new(
        "root",
        children,
        ctx.supervisor_config.clone(),
        ctx.safety.clone(),
    )
    .spawn()
    .await
}

fn device_context(ctx: &Arc<TreeContext>, name: Name, topic: Path, frame: Name) -> DeviceContext {
    DeviceContext {
        name,
        topic,
        frame,
        description: Arc::clone(&ctx.description),
        robot_state: ctx.robot_state.clone(),
        params: ctx.params.clone(),
        pubsub: ctx.pubsub.clone(),
        registry: ctx.registry.clone(),
        safety: ctx.safety.clone(),
        auto_disarm_on_error: ctx.auto_disarm_on_error,
    }
}

fn register_device(
    ctx: &Arc<TreeContext>,
    name: &Name,
    kind: ActorKind,
) -> Result<
    (
        crate::mailbox::MailboxReceiver<BusMsg>,
        RegistrationGuard,
    ),
    RuntimeError,
> {
    let (sender, receiver) = mailbox(Some(64), OverflowPolicy::Block);
    let handle = ActorHandle::new(name.clone(), kind, sender);
    let guard = ctx
        .registry
        .register(name.clone(), handle)
        .map_err(|e| RuntimeError::invalid(e.to_string()))?;
    Ok((receiver, guard))
}

fn sensor_topic(decl: &SensorDecl, description: &RobotDescription) -> (Path, Name) {
    match &decl.mount {
        Mount::Robot => (
            Path::from(["sensor"]).join(decl.name.clone()),
            description.topology().root().clone(),
        ),
        Mount::Link(link) => (
            Path::from(["sensor"]).join(link.clone()).join(decl.name.clone()),
            link.clone(),
        ),
        Mount::Joint(joint) => (
            Path::from(["sensor"]).join(joint.clone()).join(decl.name.clone()),
            joint.clone(),
        ),
    }
}

// ---- leaf specs --------------------------------------------------------

fn sensor_child_spec(ctx: Arc<TreeContext>, decl: SensorDecl) -> ChildSpec {
    let name = decl.name.clone();
    ChildSpec {
        name: name.clone(),
        policy: RestartPolicy::Permanent,
        start: Box::new(move || {
            let ctx = Arc::clone(&ctx);
            let decl = decl.clone();
            async move {
                // Options are validated against the declared schema on
                // every (re)start.
                let options = decl.options_schema.apply(&decl.options).map_err(|failures| {
                    RuntimeError::invalid(format!(
                        "sensor '{}' options rejected: {failures:?}",
                        decl.name
                    ))
                })?;
                let factory = ctx.bindings.sensors.get(&decl.driver).ok_or_else(|| {
                    RuntimeError::invalid(format!(
                        "no sensor driver bound for '{}'",
                        decl.driver
                    ))
                })?;
                let driver = factory.create(&options)?;

                let (topic, frame) = sensor_topic(&decl, &ctx.description);
                let (receiver, guard) = register_device(&ctx, &decl.name, ActorKind::Sensor)?;
                let device_ctx = device_context(&ctx, decl.name.clone(), topic, frame);
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let task = spawn_sensor(device_ctx, driver, receiver, shutdown_rx, guard);
                Ok(RunningChild {
                    task,
                    shutdown: shutdown_tx,
                })
            }
            .boxed()
        }),
    }
}

fn actuator_child_spec(ctx: Arc<TreeContext>, decl: ActuatorDecl) -> ChildSpec {
    let name = decl.name.clone();
    ChildSpec {
        name: name.clone(),
        policy: RestartPolicy::Permanent,
        start: Box::new(move || {
            let ctx = Arc::clone(&ctx);
            let decl = decl.clone();
            async move {
                let options = decl.options_schema.apply(&decl.options).map_err(|failures| {
                    RuntimeError::invalid(format!(
                        "actuator '{}' options rejected: {failures:?}",
                        decl.name
                    ))
                })?;
                let driver: Box<dyn ActuatorDriver> = match ctx.simulation {
                    SimulationMode::Kinematic => Box::new(MockActuator::new(decl.joint.clone())),
                    SimulationMode::None => {
                        let factory =
                            ctx.bindings.actuators.get(&decl.driver).ok_or_else(|| {
                                RuntimeError::invalid(format!(
                                    "no actuator driver bound for '{}'",
                                    decl.driver
                                ))
                            })?;
                        factory.create(&options)?
                    }
                };

                let topic = Path::from(["actuator"])
                    .join(decl.joint.clone())
                    .join(decl.name.clone());
                let (receiver, guard) = register_device(&ctx, &decl.name, ActorKind::Actuator)?;
                let device_ctx =
                    device_context(&ctx, decl.name.clone(), topic, decl.joint.clone());
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let task = spawn_actuator(device_ctx, driver, receiver, shutdown_rx, guard);
                Ok(RunningChild {
                    task,
                    shutdown: shutdown_tx,
                })
            }
            .boxed()
        }),
    }
}

fn controller_child_spec(ctx: Arc<TreeContext>, name: Name) -> ChildSpec {
    ChildSpec {
        name: name.clone(),
        policy: RestartPolicy::Permanent,
        start: Box::new(move || {
            let ctx = Arc::clone(&ctx);
            let name = name.clone();
            async move {
                let decl = ctx
                    .description
                    .controllers()
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::invalid(format!("unknown controller '{name}'")))?;
                let options = decl.options_schema.apply(&decl.options).map_err(|failures| {
                    RuntimeError::invalid(format!(
                        "controller '{name}' options rejected: {failures:?}"
                    ))
                })?;
                let factory = ctx.bindings.controllers.get(&decl.driver).ok_or_else(|| {
                    RuntimeError::invalid(format!(
                        "no controller driver bound for '{}'",
                        decl.driver
                    ))
                })?;
                let driver = factory.create(&options, ctx.simulation)?;

                let topic = Path::from(["controller"]).join(name.clone());
                let (receiver, guard) = register_device(&ctx, &name, ActorKind::Controller)?;
                let frame = ctx.description.topology().root().clone();
                let device_ctx = device_context(&ctx, name.clone(), topic, frame);
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let task = spawn_controller(device_ctx, driver, receiver, shutdown_rx, guard);
                Ok(RunningChild {
                    task,
                    shutdown: shutdown_tx,
                })
            }
            .boxed()
        }),
    }
}

fn bridge_child_spec(ctx: Arc<TreeContext>, name: Name) -> ChildSpec {
    ChildSpec {
        name: name.clone(),
        policy: RestartPolicy::Permanent,
        start: Box::new(move || {
            let ctx = Arc::clone(&ctx);
            let name = name.clone();
            async move {
                let decl = ctx
                    .description
                    .bridges()
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::invalid(format!("unknown bridge '{name}'")))?;
                let options = decl.options_schema.apply(&decl.options).map_err(|failures| {
                    RuntimeError::invalid(format!("bridge '{name}' options rejected: {failures:?}"))
                })?;
                let factory = ctx.bindings.bridges.get(&decl.driver).ok_or_else(|| {
                    RuntimeError::invalid(format!("no bridge driver bound for '{}'", decl.driver))
                })?;

                let topic = Path::from(["bridge"]).join(name.clone());
                let device_ctx = device_context(&ctx, name.clone(), topic, name.clone());
                let bridge = factory.create(&options, ctx.simulation, &device_ctx)?;

                // Addressable for the parameter registry's remote calls.
                ctx.params.register_bridge(name.clone(), Arc::clone(&bridge));

                let (receiver, guard) = register_device(&ctx, &name, ActorKind::Bridge)?;
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let task = spawn_bridge(device_ctx, bridge, receiver, shutdown_rx, guard);
                Ok(RunningChild {
                    task,
                    shutdown: shutdown_tx,
                })
            }
            .boxed()
        }),
    }
}

// ---- group and topology specs ------------------------------------------

/// A child that is itself a supervisor, registered by name so the
/// subsystem stays addressable.
fn supervised_group(
    ctx: Arc<TreeContext>,
    group_name: Name,
    make_children: Arc<dyn Fn() -> Vec<ChildSpec> + Send + Sync>,
) -> ChildSpec {
    ChildSpec {
        name: group_name.clone(),
        policy: RestartPolicy::Permanent,
        start: Box::new(move || {
            let ctx = Arc::clone(&ctx);
            let group_name = group_name.clone();
            let make_children = Arc::clone(&make_children);
            async move {
                let handle = Supervisor::new(
                    group_name.clone(),
                    make_children(),
                    ctx.supervisor_config.clone(),
                    ctx.safety.clone(),
                )
                .spawn()
                .await?;
                let running = handle.into_running_child();
                register_supervisor(&ctx, group_name, running.shutdown.clone());
                Ok(running)
            }
            .boxed()
        }),
    }
}

/// Supervisors are addressable too: a relay drains the registered mailbox
/// and maps `Shutdown` onto the supervisor's shutdown flag.
fn register_supervisor(ctx: &Arc<TreeContext>, name: Name, shutdown: watch::Sender<bool>) {
    let (sender, mut receiver) = mailbox(Some(16), OverflowPolicy::DropOldest);
    let handle = ActorHandle::new(name.clone(), ActorKind::Supervisor, sender);
    let Ok(guard) = ctx.registry.register(name.clone(), handle) else {
        debug!(supervisor = %name, "supervisor name already registered");
        return;
    };
    let mut closed = shutdown.subscribe();
    tokio::spawn(async move {
        let _guard = guard;
        loop {
            tokio::select! {
                _ = closed.changed() => return,
                message = receiver.recv() => match message {
                    Some(BusMsg::Shutdown) => {
                        let _ = shutdown.send(true);
                        return;
                    }
                    Some(_) => {}
                    None => return,
                },
            }
        }
    });
}

fn sensor_group_spec(ctx: Arc<TreeContext>) -> ChildSpec {
    let make_ctx = Arc::clone(&ctx);
    supervised_group(
        ctx,
        Name::new("sensors"),
        Arc::new(move || {
            let mut decls: Vec<SensorDecl> = make_ctx
                .description
                .sensors()
                .values()
                .filter(|decl| decl.mount == Mount::Robot)
                .cloned()
                .collect();
            decls.sort_by(|a, b| a.name.cmp(&b.name));
            decls
                .into_iter()
                .map(|decl| sensor_child_spec(Arc::clone(&make_ctx), decl))
                .collect()
        }),
    )
}

fn controller_group_spec(ctx: Arc<TreeContext>) -> ChildSpec {
    let make_ctx = Arc::clone(&ctx);
    supervised_group(
        ctx,
        Name::new("controllers"),
        Arc::new(move || {
            let mut names: Vec<Name> = make_ctx
                .description
                .controllers()
                .values()
                .filter(|decl| {
                    make_ctx.simulation == SimulationMode::None
                        || decl.simulation != SimulationPolicy::Omit
                })
                .map(|decl| decl.name.clone())
                .collect();
            names.sort();
            names
                .into_iter()
                .map(|name| controller_child_spec(Arc::clone(&make_ctx), name))
                .collect()
        }),
    )
}

fn bridge_group_spec(ctx: Arc<TreeContext>) -> ChildSpec {
    let make_ctx = Arc::clone(&ctx);
    supervised_group(
        ctx,
        Name::new("bridges"),
        Arc::new(move || {
            let mut names: Vec<Name> = make_ctx
                .description
                .bridges()
                .values()
                .filter(|decl| {
                    make_ctx.simulation == SimulationMode::None
                        || decl.simulation != SimulationPolicy::Omit
                })
                .map(|decl| decl.name.clone())
                .collect();
            names.sort();
            names
                .into_iter()
                .map(|name| bridge_child_spec(Arc::clone(&make_ctx), name))
                .collect()
        }),
    )
}

/// Link supervisors register under the link's own name, so the physical
/// topology is addressable directly (`registry.lookup("base")`).
fn link_spec(ctx: Arc<TreeContext>, link: Name) -> ChildSpec {
    let make_ctx = Arc::clone(&ctx);
    let make_link = link.clone();
    supervised_group(
        ctx,
        link,
        Arc::new(move || {
            let mut children = Vec::new();

            let mut sensors: Vec<SensorDecl> = make_ctx
                .description
                .sensors()
                .values()
                .filter(|decl| decl.mount == Mount::Link(make_link.clone()))
                .cloned()
                .collect();
            sensors.sort_by(|a, b| a.name.cmp(&b.name));
            for decl in sensors {
                children.push(sensor_child_spec(Arc::clone(&make_ctx), decl));
            }

            for joint in make_ctx.description.topology().child_joints(&make_link) {
                children.push(joint_spec(Arc::clone(&make_ctx), joint.clone()));
            }
            children
        }),
    )
}

/// Joint supervisors register under the joint's own name.
fn joint_spec(ctx: Arc<TreeContext>, joint: Name) -> ChildSpec {
    let make_ctx = Arc::clone(&ctx);
    let make_joint = joint.clone();
    supervised_group(
        ctx,
        joint,
        Arc::new(move || {
            let mut children = Vec::new();

            let mut sensors: Vec<SensorDecl> = make_ctx
                .description
                .sensors()
                .values()
                .filter(|decl| decl.mount == Mount::Joint(make_joint.clone()))
                .cloned()
                .collect();
            sensors.sort_by(|a, b| a.name.cmp(&b.name));
            for decl in sensors {
                children.push(sensor_child_spec(Arc::clone(&make_ctx), decl));
            }

            for decl in make_ctx.description.actuators_for_joint(&make_joint) {
                children.push(actuator_child_spec(Arc::clone(&make_ctx), (*decl).clone()));
            }

            if let Some(child_link) = make_ctx
                .description
                .joints()
                .get(&make_joint)
                .map(|j| j.child_link.clone())
            {
                children.push(link_spec(Arc::clone(&make_ctx), child_link));
            }
            children
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use botsys_model::{
        Joint, JointKind, JointLimits, Quaternion, RobotBuilder, Schema, SchemaEntry, Transform,
        Value, ValueType, Vec3,
    };

    use crate::device::actuator::ActuatorApi;
    use crate::message::{
        ActuatorCommand, ActuatorCommandKind, ImuReading, Payload, PayloadKind,
    };
    use crate::pubsub::SubscribeOptions;

    struct FixedImu;

    #[async_trait]
    impl crate::device::SensorDriver for FixedImu {
        fn sample_interval(&self) -> Duration {
            Duration::from_millis(5)
        }

        async fn read(
            &mut self,
            _ctx: &DeviceContext,
        ) -> Result<Option<Payload>, RuntimeError> {
            Ok(Some(Payload::Imu(ImuReading {
                orientation: Quaternion::identity(),
                angular_velocity: Vec3::zero(),
                linear_acceleration: Vec3::new(0.0, 0.0, 9.81),
            })))
        }
    }

    struct CountingServo {
        applied: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl crate::device::ActuatorDriver for CountingServo {
        async fn apply(
            &mut self,
            _command: &ActuatorCommand,
            _ctx: &DeviceContext,
        ) -> Result<crate::device::MotionPlan, RuntimeError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(crate::device::MotionPlan::settling_in(Duration::from_millis(1)))
        }
    }

    fn description() -> Arc<RobotDescription> {
        Arc::new(
            RobotBuilder::new("rig")
                .link(botsys_model::Link::new("base"))
                .link(botsys_model::Link::new("arm"))
                .joint(Joint {
                    name: "shoulder".into(),
                    kind: JointKind::Revolute,
                    parent_link: "base".into(),
                    child_link: "arm".into(),
                    axis: Vec3::new(0.0, 0.0, 1.0),
                    origin: Transform::identity(),
                    limits: Some(JointLimits::symmetric(1.5, 10.0, 2.0)),
                })
                .sensor(botsys_model::SensorDecl {
                    name: "imu".into(),
                    driver: "imu_driver".into(),
                    mount: Mount::Link("base".into()),
                    options: Options::new(),
                    options_schema: Schema::new().with(
                        "rate_hz",
                        SchemaEntry::new(ValueType::Float)
                            .with_min(0.1)
                            .with_default(Value::Float(100.0)),
                    ),
                })
                .actuator(botsys_model::ActuatorDecl {
                    name: "servo".into(),
                    driver: "servo_driver".into(),
                    joint: "shoulder".into(),
                    options: Options::new(),
                    options_schema: Schema::new(),
                })
                .build()
                .unwrap(),
        )
    }

    struct Fixture {
        ctx: Arc<TreeContext>,
        applied: Arc<AtomicUsize>,
    }

    fn fixture(simulation: SimulationMode) -> Fixture {
        let description = description();
        let pubsub = PubSubRouter::new();
        let params = ParamRegistry::new(pubsub.clone());
        let safety = SafetyController::new(pubsub.clone());
        let robot_state = RobotState::new(Arc::clone(&description), true);
        let applied = Arc::new(AtomicUsize::new(0));
        let applied_for_factory = Arc::clone(&applied);

        let bindings = DeviceBindings::new()
            .sensor_fn("imu_driver", |_options: &Options| {
                Ok(Box::new(FixedImu) as Box<dyn crate::device::SensorDriver>)
            })
            .actuator_fn("servo_driver", move |_options: &Options| {
                Ok(Box::new(CountingServo {
                    applied: Arc::clone(&applied_for_factory),
                }) as Box<dyn crate::device::ActuatorDriver>)
            });

        let ctx = Arc::new(TreeContext {
            description,
            registry: ProcessRegistry::new(),
            pubsub,
            params,
            safety,
            robot_state,
            bindings,
            simulation,
            auto_disarm_on_error: false,
            supervisor_config: SupervisorConfig::default(),
        });
        Fixture { ctx, applied }
    }

    #[tokio::test]
    async fn test_tree_registers_topology_and_devices() {
        let fixture = fixture(SimulationMode::None);
        let root = spawn_tree(Arc::clone(&fixture.ctx)).await.unwrap();

        for name in ["base", "shoulder", "arm", "imu", "servo", "sensors", "controllers", "bridges"] {
            assert!(
                fixture.ctx.registry.contains(&Name::new(name)),
                "registry is missing '{name}'"
            );
        }

        root.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_mounted_sensor_publishes() {
        let fixture = fixture(SimulationMode::None);
        let mut sub = fixture.ctx.pubsub.subscribe(
            Path::from(["sensor", "base"]),
            SubscribeOptions::new().with_message_types([PayloadKind::Imu]),
        );
        let root = spawn_tree(Arc::clone(&fixture.ctx)).await.unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.frame_id, Name::new("base"));

        root.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_actuator_safety_gate_and_call() {
        let fixture = fixture(SimulationMode::None);
        let root = spawn_tree(Arc::clone(&fixture.ctx)).await.unwrap();
        let api = ActuatorApi::new(
            fixture.ctx.registry.clone(),
            fixture.ctx.pubsub.clone(),
            Arc::clone(&fixture.ctx.description),
        );
        let command = ActuatorCommand::new(ActuatorCommandKind::Position { position: 0.5 });

        // Disarmed: the synchronous call reports the rejection.
        let err = api
            .call(&Name::new("servo"), command.clone(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Safety);
        assert_eq!(fixture.applied.load(Ordering::SeqCst), 0);

        // Armed: accepted and applied, feedback on the actuator topic.
        let mut feedback = fixture.ctx.pubsub.subscribe(
            Path::from(["actuator", "shoulder", "servo"]),
            SubscribeOptions::new().with_message_types([PayloadKind::ActuatorFeedback]),
        );
        fixture.ctx.safety.arm().unwrap();
        api.call(&Name::new("servo"), command.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(fixture.applied.load(Ordering::SeqCst), 1);
        assert!(matches!(
            feedback.recv().await.unwrap().payload,
            Payload::ActuatorFeedback(_)
        ));

        // Broadcast mode reaches the actuator through its subscription.
        api.broadcast(&Name::new("servo"), command.clone()).unwrap();
        // Direct cast mode.
        api.cast(&Name::new("servo"), command).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.applied.load(Ordering::SeqCst), 3);

        root.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_kinematic_simulation_substitutes_mock() {
        let fixture = fixture(SimulationMode::Kinematic);
        let root = spawn_tree(Arc::clone(&fixture.ctx)).await.unwrap();
        let api = ActuatorApi::new(
            fixture.ctx.registry.clone(),
            fixture.ctx.pubsub.clone(),
            Arc::clone(&fixture.ctx.description),
        );

        let mut feedback = fixture.ctx.pubsub.subscribe(
            Path::from(["actuator", "shoulder", "servo"]),
            SubscribeOptions::new().with_message_types([PayloadKind::ActuatorFeedback]),
        );
        fixture.ctx.safety.arm().unwrap();
        api.call(
            &Name::new("servo"),
            ActuatorCommand::new(ActuatorCommandKind::Position { position: 1.0 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        // The mock predicts arrival from the joint's velocity limit.
        match feedback.recv().await.unwrap().payload {
            Payload::ActuatorFeedback(crate::message::ActuatorFeedback::BeginMotion {
                expected_arrival_ns,
                ..
            }) => assert!(expected_arrival_ns.is_some()),
            other => panic!("unexpected payload {other:?}"),
        }
        // The real driver was never built.
        assert_eq!(fixture.applied.load(Ordering::SeqCst), 0);

        root.stop().await.unwrap();
    }
}
