//! Per-robot process registry: name-to-actor resolution.

pub mod duplicate;
pub mod process;

pub use duplicate::DuplicateRegistry;
pub use process::{ProcessRegistry, RegistrationGuard, RegistryError};
