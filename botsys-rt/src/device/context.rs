//! The capsule a device actor runs with.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::warn;

// Layer 3: Internal module imports
use botsys_model::{Name, Path, RobotDescription};

use crate::error::{ErrorKind, RuntimeError};
use crate::message::{DiagnosticEvent, DiagnosticLevel, Envelope, Payload};
use crate::param::ParamRegistry;
use crate::pubsub::PubSubRouter;
use crate::registry::ProcessRegistry;
use crate::safety::SafetyController;
use crate::state::RobotState;

/// Everything a device driver can reach: its identity and place in the
/// topology, plus the shared runtime services.
#[derive(Clone)]
pub struct DeviceContext {
    /// Device name.
    pub name: Name,
    /// Publish topic for this device's family (`[sensor|actuator] + ...`).
    pub topic: Path,
    /// Frame id stamped on emitted envelopes (the mount point).
    pub frame: Name,
    /// The immutable description.
    pub description: Arc<RobotDescription>,
    /// Joint-state reads.
    pub robot_state: RobotState,
    /// Parameter reads.
    pub params: ParamRegistry,
    /// The fabric.
    pub pubsub: PubSubRouter,
    /// Name resolution.
    pub registry: ProcessRegistry,
    /// The safety latch.
    pub safety: SafetyController,
    /// Disarm automatically when this device reports a hardware fault.
    pub auto_disarm_on_error: bool,
}

impl DeviceContext {
    /// Publish a payload on this device's topic, stamped now.
    pub fn publish(&self, payload: Payload) -> Result<usize, RuntimeError> {
        let envelope = Envelope::new(self.frame.clone(), payload)?;
        Ok(self.pubsub.publish(&self.topic, envelope))
    }

    /// Emit a diagnostic event on `[diagnostic]`.
    pub fn diagnostic(&self, level: DiagnosticLevel, message: impl Into<String>) {
        let payload = Payload::Diagnostic(DiagnosticEvent::new(self.name.clone(), level, message));
        match Envelope::new(self.frame.clone(), payload) {
            Ok(envelope) => {
                self.pubsub.publish(&Path::from(["diagnostic"]), envelope);
            }
            Err(err) => warn!(device = %self.name, error = %err, "diagnostic dropped"),
        }
    }

    /// Device-fault bookkeeping: emit a diagnostic and, for hardware
    /// faults with auto-disarm enabled, trigger the safety cascade.
    pub async fn report_fault(&self, error: &RuntimeError) {
        self.diagnostic(DiagnosticLevel::Error, error.to_string());
        if self.auto_disarm_on_error && error.kind == ErrorKind::Hardware && self.safety.armed() {
            warn!(device = %self.name, "hardware fault, auto-disarming");
            let _ = self.safety.disarm().await;
        }
    }
}
