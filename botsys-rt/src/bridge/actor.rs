//! The bridge actor: local-change fan-out to a remote peer.
//!
//! Every bridge is auto-subscribed to `[param]`; each local parameter
//! change is forwarded through [`Bridge::on_local_change`]. Forwarding
//! failures are surfaced as diagnostics and do not crash the actor — a
//! flapping remote must not burn the supervision tree's restart budget.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

// Layer 3: Internal module imports
use botsys_model::Path;

use crate::actor::BusMsg;
use crate::bridge::traits::Bridge;
use crate::device::DeviceContext;
use crate::error::RuntimeError;
use crate::mailbox::MailboxReceiver;
use crate::message::{DiagnosticLevel, Payload, PayloadKind};
use crate::pubsub::SubscribeOptions;
use crate::registry::RegistrationGuard;

/// Run one bridge actor until shutdown.
pub(crate) fn spawn_bridge(
    ctx: DeviceContext,
    bridge: Arc<dyn Bridge>,
    mut mailbox: MailboxReceiver<BusMsg>,
    mut shutdown: watch::Receiver<bool>,
    registration: RegistrationGuard,
) -> JoinHandle<Result<(), RuntimeError>> {
    let mut changes = ctx.pubsub.subscribe(
        Path::from(["param"]),
        SubscribeOptions::new().with_message_types([PayloadKind::ParameterChanged]),
    );

    tokio::spawn(async move {
        let _registration = registration;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(bridge = %ctx.name, "bridge stopping");
                    return Ok(());
                }
                message = mailbox.recv() => match message {
                    Some(BusMsg::Shutdown) | None => return Ok(()),
                    Some(_) => {}
                },
                envelope = changes.recv() => match envelope {
                    Some(envelope) => {
                        let Payload::ParameterChanged(change) = envelope.payload else {
                            continue;
                        };
                        if let Err(err) = bridge.on_local_change(&change).await {
                            ctx.diagnostic(
                                DiagnosticLevel::Warn,
                                format!("forwarding {} failed: {err}", change.path),
                            );
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use botsys_model::{Link, Name, RobotBuilder, Schema, SchemaEntry, Value, ValueType};
    use parking_lot::Mutex;

    use crate::actor::{ActorHandle, ActorKind};
    use crate::bridge::traits::RemoteParam;
    use crate::mailbox::{mailbox, OverflowPolicy};
    use crate::message::ParameterChanged;
    use crate::param::ParamRegistry;
    use crate::pubsub::PubSubRouter;
    use crate::registry::ProcessRegistry;
    use crate::safety::SafetyController;
    use crate::state::RobotState;

    #[derive(Default)]
    struct RecordingBridge {
        forwarded: Mutex<Vec<ParameterChanged>>,
        remote_sets: AtomicUsize,
    }

    #[async_trait]
    impl Bridge for RecordingBridge {
        async fn on_local_change(&self, change: &ParameterChanged) -> Result<(), RuntimeError> {
            self.forwarded.lock().push(change.clone());
            Ok(())
        }

        async fn list_remote(&self) -> Result<Vec<RemoteParam>, RuntimeError> {
            Ok(vec![RemoteParam {
                id: "remote.gain".to_string(),
                value: Value::Float(1.5),
                value_type: Some(ValueType::Float),
                doc: None,
                path: None,
            }])
        }

        async fn get_remote(&self, _id: &str) -> Result<Value, RuntimeError> {
            Ok(Value::Float(1.5))
        }

        async fn set_remote(&self, _id: &str, _value: Value) -> Result<(), RuntimeError> {
            self.remote_sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe_remote(&self, _id: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn fixture() -> (DeviceContext, ParamRegistry, ProcessRegistry) {
        let description = Arc::new(
            RobotBuilder::new("rig")
                .link(Link::new("base"))
                .build()
                .unwrap(),
        );
        let pubsub = PubSubRouter::new();
        let params = ParamRegistry::new(pubsub.clone());
        params
            .register(
                &Path::from(["pid"]),
                &Schema::new().with(
                    "kp",
                    SchemaEntry::new(ValueType::Float)
                        .with_min(0.0)
                        .with_default(Value::Float(1.0)),
                ),
            )
            .unwrap();
        let registry = ProcessRegistry::new();
        let ctx = DeviceContext {
            name: Name::new("cloud"),
            topic: Path::from(["bridge", "cloud"]),
            frame: Name::new("cloud"),
            robot_state: RobotState::new(Arc::clone(&description), true),
            description,
            params: params.clone(),
            pubsub,
            registry: registry.clone(),
            safety: SafetyController::new(PubSubRouter::new()),
            auto_disarm_on_error: false,
        };
        (ctx, params, registry)
    }

    #[tokio::test]
    async fn test_local_changes_forwarded() {
        let (ctx, params, registry) = fixture();
        let bridge = Arc::new(RecordingBridge::default());

        let (sender, receiver) = mailbox(Some(8), OverflowPolicy::Block);
        let guard = registry
            .register(
                ctx.name.clone(),
                ActorHandle::new(ctx.name.clone(), ActorKind::Bridge, sender),
            )
            .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = spawn_bridge(ctx, Arc::clone(&bridge) as Arc<dyn Bridge>, receiver, shutdown_rx, guard);

        // Give the actor's subscription a beat, then change a parameter.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        params.set(&Path::from(["pid", "kp"]), Value::Float(2.5)).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        {
            let forwarded = bridge.forwarded.lock();
            assert_eq!(forwarded.len(), 1);
            assert_eq!(forwarded[0].new, Value::Float(2.5));
        }

        let _ = shutdown_tx.send(true);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_remote_operations_via_param_registry() {
        let (_, params, _) = fixture();
        let bridge = Arc::new(RecordingBridge::default());
        params.register_bridge(Name::new("cloud"), Arc::clone(&bridge) as Arc<dyn Bridge>);

        let listed = params.list_remote(&Name::new("cloud")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "remote.gain");

        assert_eq!(
            params.get_remote(&Name::new("cloud"), "remote.gain").await.unwrap(),
            Value::Float(1.5)
        );

        params
            .set_remote(&Name::new("cloud"), "remote.gain", Value::Float(2.0))
            .await
            .unwrap();
        assert_eq!(bridge.remote_sets.load(Ordering::SeqCst), 1);

        params
            .subscribe_remote(&Name::new("cloud"), "remote.gain")
            .await
            .unwrap();
    }
}
