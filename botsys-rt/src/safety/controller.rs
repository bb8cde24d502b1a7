//! The safety controller.
//!
//! Holds the `armed`/`disarmed`/`error` latch in an atomic cell readable
//! from anywhere, and the disarm-callback side-table. Callbacks are stored
//! independently of their owning actor, so hardware can still be disarmed
//! after the owner crashed.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

// Layer 3: Internal module imports
use botsys_model::{Name, Path, Value};

use crate::error::RuntimeError;
use crate::message::{DiagnosticEvent, DiagnosticLevel, Envelope, Payload};
use crate::pubsub::PubSubRouter;

/// The safety latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyState {
    /// Hardware may actuate.
    Armed,
    /// Hardware is in a safe, non-actuating state.
    Disarmed,
    /// A disarm callback failed; arming is locked until `force_disarm`.
    Error,
}

impl SafetyState {
    fn encode(self) -> u8 {
        match self {
            SafetyState::Disarmed => 0,
            SafetyState::Armed => 1,
            SafetyState::Error => 2,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            1 => SafetyState::Armed,
            2 => SafetyState::Error,
            _ => SafetyState::Disarmed,
        }
    }
}

/// Transition notification sent to command actors.
///
/// `Disarming` precedes callback execution so commands can stop before
/// hardware power drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyPhase {
    /// Disarm started; callbacks are about to run.
    Disarming,
    /// Disarm completed.
    Disarmed,
    /// A callback failed; the latch is in error.
    Error,
}

/// Hardware disarm hook.
///
/// Implementations must be self-contained: everything needed to reach the
/// hardware is captured in the callback (or in `opts`), never borrowed
/// from the owning actor's state.
#[async_trait]
pub trait DisarmCallback: Send + Sync {
    /// Force the owned hardware into a safe, non-actuating state.
    async fn disarm(&self, opts: &Value) -> Result<(), RuntimeError>;
}

#[async_trait]
impl<F, Fut> DisarmCallback for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), RuntimeError>> + Send,
{
    async fn disarm(&self, opts: &Value) -> Result<(), RuntimeError> {
        self(opts.clone()).await
    }
}

/// One failed callback from a disarm pass.
#[derive(Debug, Clone)]
pub struct DisarmFailure {
    /// Owner that registered the callback.
    pub owner: Name,
    /// Why it failed.
    pub error: RuntimeError,
}

/// Safety API failure.
#[derive(Debug, Error)]
pub enum SafetyError {
    /// `arm` while already armed.
    #[error("already armed")]
    AlreadyArmed,
    /// `arm` while the latch is in error.
    #[error("safety latch is in error; force_disarm after hardware inspection")]
    InError,
    /// `force_disarm` while the latch is not in error.
    #[error("force_disarm is only valid from the error state")]
    NotInError,
    /// `disarm` had failing callbacks; the latch is now in error.
    #[error("{} disarm callback(s) failed", failures.len())]
    DisarmFailed {
        /// The callbacks that failed, in invocation order.
        failures: Vec<DisarmFailure>,
    },
}

struct Registration {
    owner: Name,
    callback: Arc<dyn DisarmCallback>,
    opts: Value,
}

struct Inner {
    latch: AtomicU8,
    /// Side-table: lives here, not in any owner actor, so entries survive
    /// owner death.
    registrations: parking_lot::Mutex<Vec<Registration>>,
    phases: broadcast::Sender<SafetyPhase>,
    pubsub: PubSubRouter,
}

/// The per-robot safety controller.
///
/// Cheap to clone; all clones share the latch and the side-table.
#[derive(Clone)]
pub struct SafetyController {
    inner: Arc<Inner>,
}

impl SafetyController {
    /// Create a controller in the `Disarmed` state.
    pub fn new(pubsub: PubSubRouter) -> Self {
        let (phases, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                latch: AtomicU8::new(SafetyState::Disarmed.encode()),
                registrations: parking_lot::Mutex::new(Vec::new()),
                phases,
                pubsub,
            }),
        }
    }

    /// Current latch value (atomic read, callable from anywhere).
    pub fn state(&self) -> SafetyState {
        SafetyState::decode(self.inner.latch.load(Ordering::Acquire))
    }

    /// Whether the latch is `Armed`.
    pub fn armed(&self) -> bool {
        self.state() == SafetyState::Armed
    }

    /// Whether the latch is `Error`.
    pub fn in_error(&self) -> bool {
        self.state() == SafetyState::Error
    }

    /// Subscribe to safety-phase notifications (command actors).
    pub fn subscribe_phases(&self) -> broadcast::Receiver<SafetyPhase> {
        self.inner.phases.subscribe()
    }

    /// Register a disarm callback on behalf of `owner`.
    ///
    /// The entry goes into the controller's side-table and outlives the
    /// owner actor.
    pub fn register(&self, owner: Name, callback: Arc<dyn DisarmCallback>, opts: Value) {
        info!(owner = %owner, "safety callback registered");
        self.inner.registrations.lock().push(Registration {
            owner,
            callback,
            opts,
        });
    }

    /// Remove every callback registered by `owner` (clean shutdown of a
    /// device that no longer controls hardware).
    pub fn unregister_owner(&self, owner: &Name) -> usize {
        let mut registrations = self.inner.registrations.lock();
        let before = registrations.len();
        registrations.retain(|registration| &registration.owner != owner);
        before - registrations.len()
    }

    /// Number of registered callbacks.
    pub fn registration_count(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    /// Arm. Valid only from `Disarmed`.
    pub fn arm(&self) -> Result<(), SafetyError> {
        match self.inner.latch.compare_exchange(
            SafetyState::Disarmed.encode(),
            SafetyState::Armed.encode(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                info!("armed");
                self.publish_diag(DiagnosticLevel::Ok, "armed");
                Ok(())
            }
            Err(raw) => match SafetyState::decode(raw) {
                SafetyState::Armed => Err(SafetyError::AlreadyArmed),
                SafetyState::Error => Err(SafetyError::InError),
                // Raced with another arm; treat as already armed.
                SafetyState::Disarmed => Err(SafetyError::AlreadyArmed),
            },
        }
    }

    /// Disarm: invoke every registered callback in reverse registration
    /// order.
    ///
    /// All callbacks are attempted even after a failure. When all succeed
    /// the latch goes to `Disarmed`; otherwise it latches `Error` and the
    /// failures are returned.
    pub async fn disarm(&self) -> Result<(), SafetyError> {
        let _ = self.inner.phases.send(SafetyPhase::Disarming);
        self.publish_diag(DiagnosticLevel::Warn, "disarming");

        // Snapshot under the lock, run outside it: callbacks may take
        // arbitrarily long talking to hardware.
        let snapshot: Vec<(Name, Arc<dyn DisarmCallback>, Value)> = {
            let registrations = self.inner.registrations.lock();
            registrations
                .iter()
                .rev()
                .map(|r| (r.owner.clone(), Arc::clone(&r.callback), r.opts.clone()))
                .collect()
        };

        let mut failures = Vec::new();
        for (owner, callback, opts) in snapshot {
            if let Err(err) = callback.disarm(&opts).await {
                error!(owner = %owner, error = %err, "disarm callback failed");
                failures.push(DisarmFailure { owner, error: err });
            }
        }

        if failures.is_empty() {
            self.inner
                .latch
                .store(SafetyState::Disarmed.encode(), Ordering::Release);
            let _ = self.inner.phases.send(SafetyPhase::Disarmed);
            self.publish_diag(DiagnosticLevel::Ok, "disarmed");
            Ok(())
        } else {
            self.inner
                .latch
                .store(SafetyState::Error.encode(), Ordering::Release);
            let _ = self.inner.phases.send(SafetyPhase::Error);
            self.publish_diag(DiagnosticLevel::Error, "disarm failed, latch in error");
            Err(SafetyError::DisarmFailed { failures })
        }
    }

    /// Clear the error latch after manual hardware inspection.
    pub fn force_disarm(&self) -> Result<(), SafetyError> {
        match self.inner.latch.compare_exchange(
            SafetyState::Error.encode(),
            SafetyState::Disarmed.encode(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                warn!("force-disarmed after error");
                let _ = self.inner.phases.send(SafetyPhase::Disarmed);
                self.publish_diag(DiagnosticLevel::Warn, "force-disarmed");
                Ok(())
            }
            Err(_) => Err(SafetyError::NotInError),
        }
    }

    /// Crash hook: an actor died unexpectedly. When the dead actor holds a
    /// safety registration, every registered callback is disarmed.
    pub async fn handle_owner_crash(&self, owner: &Name) {
        let holds_registration = {
            let registrations = self.inner.registrations.lock();
            registrations.iter().any(|r| &r.owner == owner)
        };
        if holds_registration && self.state() == SafetyState::Armed {
            warn!(owner = %owner, "crash of safety-registered actor, disarming");
            let _ = self.disarm().await;
        }
    }

    fn publish_diag(&self, level: DiagnosticLevel, message: &str) {
        if let Ok(envelope) = Envelope::new(
            "safety",
            Payload::Diagnostic(DiagnosticEvent::new("safety", level, message)),
        ) {
            self.inner.pubsub.publish(&Path::from(["safety"]), envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn controller() -> SafetyController {
        SafetyController::new(PubSubRouter::new())
    }

    struct RecordingCallback {
        label: usize,
        order: Arc<parking_lot::Mutex<Vec<usize>>>,
        fail: bool,
    }

    #[async_trait]
    impl DisarmCallback for RecordingCallback {
        async fn disarm(&self, _opts: &Value) -> Result<(), RuntimeError> {
            self.order.lock().push(self.label);
            if self.fail {
                Err(RuntimeError::hardware("relay stuck"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_initial_state_disarmed() {
        let safety = controller();
        assert_eq!(safety.state(), SafetyState::Disarmed);
        assert!(!safety.armed());
        assert!(!safety.in_error());
    }

    #[tokio::test]
    async fn test_arm_only_from_disarmed() {
        let safety = controller();
        assert!(safety.arm().is_ok());
        assert!(safety.armed());
        assert!(matches!(safety.arm(), Err(SafetyError::AlreadyArmed)));
    }

    #[tokio::test]
    async fn test_disarm_reverse_registration_order() {
        let safety = controller();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for label in 0..3 {
            safety.register(
                Name::new(format!("owner{label}")),
                Arc::new(RecordingCallback {
                    label,
                    order: Arc::clone(&order),
                    fail: false,
                }),
                Value::Bool(true),
            );
        }

        safety.arm().unwrap();
        safety.disarm().await.unwrap();

        assert_eq!(*order.lock(), vec![2, 1, 0]);
        assert_eq!(safety.state(), SafetyState::Disarmed);
    }

    #[tokio::test]
    async fn test_failed_callback_latches_error() {
        let safety = controller();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        safety.register(
            Name::new("good"),
            Arc::new(RecordingCallback {
                label: 0,
                order: Arc::clone(&order),
                fail: false,
            }),
            Value::Bool(true),
        );
        safety.register(
            Name::new("bad"),
            Arc::new(RecordingCallback {
                label: 1,
                order: Arc::clone(&order),
                fail: true,
            }),
            Value::Bool(true),
        );

        safety.arm().unwrap();
        let err = safety.disarm().await.unwrap_err();
        match err {
            SafetyError::DisarmFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].owner, Name::new("bad"));
            }
            other => panic!("unexpected error {other}"),
        }
        // All callbacks were still attempted
        assert_eq!(order.lock().len(), 2);
        assert!(safety.in_error());
        assert!(matches!(safety.arm(), Err(SafetyError::InError)));
    }

    #[tokio::test]
    async fn test_force_disarm_only_from_error() {
        let safety = controller();
        assert!(matches!(safety.force_disarm(), Err(SafetyError::NotInError)));

        safety.register(
            Name::new("bad"),
            Arc::new(RecordingCallback {
                label: 0,
                order: Arc::new(parking_lot::Mutex::new(Vec::new())),
                fail: true,
            }),
            Value::Bool(true),
        );
        safety.arm().unwrap();
        let _ = safety.disarm().await;
        assert!(safety.in_error());

        safety.force_disarm().unwrap();
        assert_eq!(safety.state(), SafetyState::Disarmed);
        assert!(safety.arm().is_ok());
    }

    #[tokio::test]
    async fn test_callback_survives_owner_death() {
        let safety = controller();
        let invoked = Arc::new(AtomicUsize::new(0));

        // Register from a task that terminates before disarm runs.
        let safety_clone = safety.clone();
        let invoked_clone = Arc::clone(&invoked);
        let task = tokio::spawn(async move {
            let counter = Arc::clone(&invoked_clone);
            safety_clone.register(
                Name::new("short_lived"),
                Arc::new(move |_opts: Value| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok::<(), RuntimeError>(())
                    }
                }),
                Value::Bool(true),
            );
        });
        task.await.unwrap();

        safety.arm().unwrap();
        safety.disarm().await.unwrap();
        assert_eq!(invoked.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_owner_crash_triggers_disarm() {
        let safety = controller();
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        safety.register(
            Name::new("servo"),
            Arc::new(move |_opts: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok::<(), RuntimeError>(())
                }
            }),
            Value::Bool(true),
        );

        safety.arm().unwrap();
        safety.handle_owner_crash(&Name::new("servo")).await;
        assert_eq!(invoked.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(safety.state(), SafetyState::Disarmed);

        // Crash of an unregistered actor changes nothing.
        safety.arm().unwrap();
        safety.handle_owner_crash(&Name::new("bystander")).await;
        assert!(safety.armed());
    }

    #[tokio::test]
    async fn test_phase_notifications() {
        let safety = controller();
        let mut phases = safety.subscribe_phases();

        safety.arm().unwrap();
        safety.disarm().await.unwrap();

        assert_eq!(phases.recv().await.unwrap(), SafetyPhase::Disarming);
        assert_eq!(phases.recv().await.unwrap(), SafetyPhase::Disarmed);
    }

    #[tokio::test]
    async fn test_unregister_owner() {
        let safety = controller();
        safety.register(
            Name::new("servo"),
            Arc::new(|_opts: Value| async { Ok::<(), RuntimeError>(()) }),
            Value::Bool(true),
        );
        assert_eq!(safety.registration_count(), 1);
        assert_eq!(safety.unregister_owner(&Name::new("servo")), 1);
        assert_eq!(safety.registration_count(), 0);
    }
}
