//! The bridge contract.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use botsys_model::{Path, Value, ValueType};

use crate::error::RuntimeError;
use crate::message::ParameterChanged;

/// One remote parameter as enumerated by a bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParam {
    /// Remote-side identifier.
    pub id: String,
    /// Current remote value.
    pub value: Value,
    /// Remote type, when the peer reports one.
    pub value_type: Option<ValueType>,
    /// Remote documentation, when the peer reports one.
    pub doc: Option<String>,
    /// Local path the remote id maps to, when the bridge defines one.
    pub path: Option<Path>,
}

/// A connector to one remote parameter system.
///
/// The runtime wraps every bridge in an actor that feeds
/// [`Bridge::on_local_change`] with each local parameter change; the
/// remote-address operations are forwarded from the parameter registry's
/// `*_remote` calls. Implementations keep their own connection state
/// behind interior mutability; all methods take `&self` so the registry
/// can call them without going through the actor mailbox.
#[async_trait]
pub trait Bridge: Send + Sync + 'static {
    /// A local parameter changed; forward it to the remote peer.
    async fn on_local_change(&self, change: &ParameterChanged) -> Result<(), RuntimeError>;

    /// Enumerate remote parameters.
    async fn list_remote(&self) -> Result<Vec<RemoteParam>, RuntimeError>;

    /// Read one remote parameter.
    async fn get_remote(&self, id: &str) -> Result<Value, RuntimeError>;

    /// Write one remote parameter.
    async fn set_remote(&self, id: &str, value: Value) -> Result<(), RuntimeError>;

    /// Mark a remote id whose updates the bridge should republish on the
    /// local pub/sub under a bridge-chosen path convention.
    async fn subscribe_remote(&self, id: &str) -> Result<(), RuntimeError>;
}
