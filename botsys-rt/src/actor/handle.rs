//! Actor handles and the message type every actor mailbox carries.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::fmt;

// Layer 2: Third-party crate imports
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use botsys_model::{Name, Value};

use crate::error::RuntimeError;
use crate::mailbox::{MailboxSender, SendError};
use crate::message::Envelope;
use crate::safety::SafetyPhase;

/// What kind of actor a handle points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    /// Sensor actor publishing readings.
    Sensor,
    /// Actuator actor driving hardware.
    Actuator,
    /// Controller actor.
    Controller,
    /// Bridge actor mirroring parameters to a remote system.
    Bridge,
    /// Command actor spawned by the runtime.
    Command,
    /// Subsystem supervisor.
    Supervisor,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorKind::Sensor => "sensor",
            ActorKind::Actuator => "actuator",
            ActorKind::Controller => "controller",
            ActorKind::Bridge => "bridge",
            ActorKind::Command => "command",
            ActorKind::Supervisor => "supervisor",
        };
        f.write_str(s)
    }
}

/// Reply to a synchronous call: the callee accepted the request, or why
/// it did not. Acceptance acknowledges receipt, not motion completion.
pub type CallReply = Result<(), RuntimeError>;

/// The message type every actor mailbox carries.
#[derive(Debug)]
pub enum BusMsg {
    /// Forwarded envelope (pub/sub relays, feedback).
    Deliver(Envelope),
    /// Direct one-way command from another actor.
    Cast(Envelope),
    /// Synchronous call carrying a reply channel.
    Call {
        /// The request.
        envelope: Envelope,
        /// Where the accepted/error reply goes.
        reply: oneshot::Sender<CallReply>,
    },
    /// Live option update after a referenced parameter changed.
    Options(BTreeMap<Name, Value>),
    /// Safety-state transition notification.
    Safety(SafetyPhase),
    /// Orderly shutdown request.
    Shutdown,
}

/// Cloneable address of a live actor.
///
/// Handles resolve through the process registry; a handle whose actor died
/// fails sends with [`SendError::Closed`] and is pruned lazily.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    name: Name,
    kind: ActorKind,
    sender: MailboxSender<BusMsg>,
}

impl ActorHandle {
    /// Create a handle from an actor's name, kind, and mailbox sender.
    pub fn new(name: Name, kind: ActorKind, sender: MailboxSender<BusMsg>) -> Self {
        Self { name, kind, sender }
    }

    /// Actor name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Actor kind.
    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    /// Whether the actor's mailbox is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// One-way asynchronous send (lowest latency delivery mode).
    pub async fn cast(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender.send(BusMsg::Cast(envelope)).await.map(|_| ())
    }

    /// One-way send without waiting for mailbox room.
    pub fn try_cast(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender.try_send(BusMsg::Cast(envelope)).map(|_| ())
    }

    /// Forward an envelope (relay delivery, feedback fan-in).
    pub async fn deliver(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender.send(BusMsg::Deliver(envelope)).await.map(|_| ())
    }

    /// Enqueue an arbitrary bus message.
    pub async fn send(&self, message: BusMsg) -> Result<(), SendError> {
        self.sender.send(message).await.map(|_| ())
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, message: BusMsg) -> Result<(), SendError> {
        self.sender.try_send(message).map(|_| ())
    }

    /// Synchronous call: deliver `envelope` and wait for the actor's
    /// accepted/error reply. The timeout is enforced by the caller.
    pub async fn call(&self, envelope: Envelope) -> Result<CallReply, SendError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(BusMsg::Call {
                envelope,
                reply: reply_tx,
            })
            .await?;
        reply_rx.await.map_err(|_| SendError::Closed)
    }
}
