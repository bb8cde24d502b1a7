//! Bridges: mirroring local parameters to remote systems and back.

pub mod actor;
pub mod traits;

pub use traits::{Bridge, RemoteParam};

pub(crate) use actor::spawn_bridge;
