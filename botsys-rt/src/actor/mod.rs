//! Actor addressing: handles, kinds, and the runtime bus message.

pub mod handle;

pub use handle::{ActorHandle, ActorKind, BusMsg, CallReply};
