//! Actuator drivers, the actuator actor loop, and the command API.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use botsys_model::{Name, Path};

use crate::actor::BusMsg;
use crate::device::context::DeviceContext;
use crate::error::{ErrorKind, RuntimeError};
use crate::mailbox::MailboxReceiver;
use crate::message::{
    ActuatorCommand, ActuatorCommandKind, ActuatorFeedback, Envelope, Payload, PayloadKind,
};
use crate::pubsub::SubscribeOptions;
use crate::registry::RegistrationGuard;
use crate::util::clock::monotonic_ns;

/// What a driver predicts about an accepted motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPlan {
    /// Predicted completion stamp (monotonic ns), when computable.
    pub expected_arrival_ns: Option<i64>,
    /// Time until the motion settles; drives the `EndMotion` feedback.
    pub settle: Option<Duration>,
}

impl MotionPlan {
    /// A motion with no completion prediction (velocity tracking, hold).
    pub fn open_ended() -> Self {
        Self {
            expected_arrival_ns: None,
            settle: None,
        }
    }

    /// A motion predicted to settle after `settle`.
    pub fn settling_in(settle: Duration) -> Self {
        Self {
            expected_arrival_ns: Some(monotonic_ns() + settle.as_nanos() as i64),
            settle: Some(settle),
        }
    }
}

/// A joint actuator.
///
/// The actor loop enforces the safety gate (commands are only accepted
/// while armed) and emits `BeginMotion`/`EndMotion` feedback; the driver
/// only talks to its hardware.
#[async_trait]
pub trait ActuatorDriver: Send + 'static {
    /// One-time setup before commands arrive.
    async fn init(&mut self, _ctx: &DeviceContext) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Apply one command to the hardware.
    async fn apply(
        &mut self,
        command: &ActuatorCommand,
        ctx: &DeviceContext,
    ) -> Result<MotionPlan, RuntimeError>;
}

/// Run one actuator actor until shutdown or failure.
///
/// The actor listens on its mailbox (direct casts and synchronous calls)
/// and on the `[actuator | path]` broadcast topic.
pub(crate) fn spawn_actuator(
    ctx: DeviceContext,
    mut driver: Box<dyn ActuatorDriver>,
    mut mailbox: MailboxReceiver<BusMsg>,
    mut shutdown: watch::Receiver<bool>,
    registration: RegistrationGuard,
) -> JoinHandle<Result<(), RuntimeError>> {
    let mut broadcast = ctx.pubsub.subscribe(
        ctx.topic.clone(),
        SubscribeOptions::new().with_message_types([PayloadKind::ActuatorCommand]),
    );

    tokio::spawn(async move {
        let _registration = registration;

        if let Err(err) = driver.init(&ctx).await {
            ctx.report_fault(&err).await;
            return Err(err);
        }

        // End-of-motion timer for the most recent accepted motion.
        let mut pending_end: Option<JoinHandle<()>> = None;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(actuator = %ctx.name, "actuator stopping");
                    break;
                }
                message = mailbox.recv() => match message {
                    Some(BusMsg::Shutdown) | None => break,
                    Some(BusMsg::Cast(envelope)) | Some(BusMsg::Deliver(envelope)) => {
                        one_way(&ctx, driver.as_mut(), envelope, &mut pending_end).await
                    }
                    Some(BusMsg::Call { envelope, reply }) => {
                        let result =
                            handle_envelope(&ctx, driver.as_mut(), envelope, &mut pending_end).await;
                        Ok(Some((reply, result)))
                    }
                    Some(_) => Ok(None),
                },
                envelope = broadcast.recv() => match envelope {
                    Some(envelope) => {
                        one_way(&ctx, driver.as_mut(), envelope, &mut pending_end).await
                    }
                    None => break,
                },
            };

            match outcome {
                Ok(None) => {}
                Ok(Some((reply, result))) => {
                    if reply.send(result).is_err() {
                        debug!(actuator = %ctx.name, "caller went away before call reply");
                    }
                }
                Err(err) => {
                    ctx.report_fault(&err).await;
                    if let Some(pending) = pending_end.take() {
                        pending.abort();
                    }
                    return Err(err);
                }
            }
        }

        if let Some(pending) = pending_end.take() {
            pending.abort();
        }
        Ok(())
    })
}

/// One-way delivery: a safety rejection was already surfaced as a
/// diagnostic and must not crash the actor; driver faults do.
async fn one_way(
    ctx: &DeviceContext,
    driver: &mut dyn ActuatorDriver,
    envelope: Envelope,
    pending_end: &mut Option<JoinHandle<()>>,
) -> Result<Option<(tokio::sync::oneshot::Sender<crate::actor::CallReply>, crate::actor::CallReply)>, RuntimeError> {
    match handle_envelope(ctx, driver, envelope, pending_end).await {
        Ok(()) => Ok(None),
        Err(err) if err.kind == ErrorKind::Safety => Ok(None),
        Err(err) => Err(err),
    }
}

/// Process one envelope; non-command payloads are ignored.
///
/// Returns `Err` both for safety rejections and for driver faults; the
/// caller decides which of those crash the actor.
async fn handle_envelope(
    ctx: &DeviceContext,
    driver: &mut dyn ActuatorDriver,
    envelope: Envelope,
    pending_end: &mut Option<JoinHandle<()>>,
) -> Result<(), RuntimeError> {
    let Payload::ActuatorCommand(command) = envelope.payload else {
        return Ok(());
    };

    // The hardware gate: nothing is accepted unless armed.
    if !ctx.safety.armed() {
        let err = RuntimeError::safety(format!(
            "actuator '{}' rejected command: not armed",
            ctx.name
        ));
        warn!(actuator = %ctx.name, "command rejected while not armed");
        ctx.diagnostic(crate::message::DiagnosticLevel::Warn, err.to_string());
        return Err(err);
    }

    let plan = driver.apply(&command, ctx).await?;

    // A new motion supersedes any pending end-of-motion feedback.
    if let Some(previous) = pending_end.take() {
        previous.abort();
    }

    match command.kind {
        ActuatorCommandKind::Stop { .. } => {
            feedback(
                ctx,
                ActuatorFeedback::EndMotion {
                    command_id: command.command_id,
                },
            );
        }
        _ => {
            feedback(
                ctx,
                ActuatorFeedback::BeginMotion {
                    command_id: command.command_id,
                    expected_arrival_ns: plan.expected_arrival_ns,
                },
            );
            if let Some(settle) = plan.settle {
                let end_ctx = ctx.clone();
                let command_id = command.command_id;
                *pending_end = Some(tokio::spawn(async move {
                    tokio::time::sleep(settle).await;
                    feedback(&end_ctx, ActuatorFeedback::EndMotion { command_id });
                }));
            }
        }
    }
    Ok(())
}

fn feedback(ctx: &DeviceContext, event: ActuatorFeedback) {
    match Envelope::new(ctx.frame.clone(), Payload::ActuatorFeedback(event)) {
        Ok(envelope) => {
            ctx.pubsub.publish(&ctx.topic, envelope);
        }
        Err(err) => warn!(actuator = %ctx.name, error = %err, "feedback dropped"),
    }
}

/// The three-mode actuator command API.
///
/// - `broadcast` publishes on `[actuator | path]` (observability and
///   orchestration);
/// - `cast` resolves the actuator in the registry and sends one-way
///   (lowest latency);
/// - `call` is the synchronous mode: the actuator replies accepted or
///   error, bounded by the caller's timeout.
#[derive(Clone)]
pub struct ActuatorApi {
    registry: crate::registry::ProcessRegistry,
    pubsub: crate::pubsub::PubSubRouter,
    description: std::sync::Arc<botsys_model::RobotDescription>,
}

impl ActuatorApi {
    /// Create the API facade.
    pub fn new(
        registry: crate::registry::ProcessRegistry,
        pubsub: crate::pubsub::PubSubRouter,
        description: std::sync::Arc<botsys_model::RobotDescription>,
    ) -> Self {
        Self {
            registry,
            pubsub,
            description,
        }
    }

    /// The broadcast topic of an actuator: `[actuator, joint, name]`.
    pub fn topic(&self, actuator: &Name) -> Result<Path, RuntimeError> {
        let decl = self
            .description
            .actuators()
            .get(actuator)
            .ok_or_else(|| RuntimeError::invalid(format!("unknown actuator '{actuator}'")))?;
        Ok(Path::from(["actuator"])
            .join(decl.joint.clone())
            .join(decl.name.clone()))
    }

    /// Broadcast mode: publish the command on the actuator's topic.
    pub fn broadcast(
        &self,
        actuator: &Name,
        command: ActuatorCommand,
    ) -> Result<usize, RuntimeError> {
        let topic = self.topic(actuator)?;
        let envelope = Envelope::new(actuator.clone(), Payload::ActuatorCommand(command))?;
        Ok(self.pubsub.publish(&topic, envelope))
    }

    /// Direct asynchronous mode: one-way send via the registry.
    pub async fn cast(&self, actuator: &Name, command: ActuatorCommand) -> Result<(), RuntimeError> {
        let handle = self
            .registry
            .lookup(actuator)
            .ok_or_else(|| RuntimeError::invalid(format!("actuator '{actuator}' not running")))?;
        let envelope = Envelope::new(actuator.clone(), Payload::ActuatorCommand(command))?;
        handle
            .cast(envelope)
            .await
            .map_err(|e| RuntimeError::protocol(format!("send to '{actuator}' failed: {e}")))
    }

    /// Synchronous mode: wait for the actuator's accepted/error reply.
    pub async fn call(
        &self,
        actuator: &Name,
        command: ActuatorCommand,
        timeout: Duration,
    ) -> Result<(), RuntimeError> {
        let handle = self
            .registry
            .lookup(actuator)
            .ok_or_else(|| RuntimeError::invalid(format!("actuator '{actuator}' not running")))?;
        let envelope = Envelope::new(actuator.clone(), Payload::ActuatorCommand(command))?;
        let reply = tokio::time::timeout(timeout, handle.call(envelope))
            .await
            .map_err(|_| RuntimeError::protocol(format!("call to '{actuator}' timed out")))?
            .map_err(|e| RuntimeError::protocol(format!("call to '{actuator}' failed: {e}")))?;
        reply
    }
}
