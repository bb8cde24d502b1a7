//! Unique-keyspace registry resolving names to live actor handles.
//!
//! Every sensor, actuator, controller, bridge, command actor, and subsystem
//! supervisor registers here under a stable name for the lifetime of its
//! task. Lookups are lock-free reads; registration for a taken name fails.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use thiserror::Error;

// Layer 3: Internal module imports
use botsys_model::Name;

use crate::actor::ActorHandle;

/// Registry operation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The unique keyspace already holds a handle for this name.
    #[error("name '{0}' is already registered")]
    AlreadyRegistered(Name),
    /// No handle is registered under this name.
    #[error("name '{0}' is not registered")]
    NotRegistered(Name),
}

/// Lock-free name-to-handle table with unique keys.
///
/// Cheap to clone; all clones share the same table.
///
/// # Example (runtime-internal usage)
///
/// ```ignore
/// let registry = ProcessRegistry::new();
/// let guard = registry.register(name.clone(), handle)?;
/// // `guard` unregisters on drop, tying the binding to the actor task.
/// let found = registry.lookup(&name);
/// ```
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    table: Arc<DashMap<Name, ActorHandle>>,
}

impl ProcessRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handle`.
    ///
    /// Returns a [`RegistrationGuard`] that removes the binding when
    /// dropped, so a terminating actor task deregisters automatically.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] when the name is occupied.
    pub fn register(
        &self,
        name: Name,
        handle: ActorHandle,
    ) -> Result<RegistrationGuard, RegistryError> {
        use dashmap::mapref::entry::Entry;
        match self.table.entry(name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(name)),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(RegistrationGuard {
                    registry: self.clone(),
                    name,
                })
            }
        }
    }

    /// Remove the binding for `name`.
    pub fn unregister(&self, name: &Name) -> Result<(), RegistryError> {
        self.table
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotRegistered(name.clone()))
    }

    /// Resolve `name` to its handle, if bound.
    pub fn lookup(&self, name: &Name) -> Option<ActorHandle> {
        self.table.get(name).map(|entry| entry.value().clone())
    }

    /// Whether `name` is currently bound.
    pub fn contains(&self, name: &Name) -> bool {
        self.table.contains_key(name)
    }

    /// Snapshot of all registered names.
    pub fn names(&self) -> Vec<Name> {
        self.table.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Removes its registration when dropped.
///
/// Held by the actor task so the binding disappears exactly when the task
/// ends, normally or not.
pub struct RegistrationGuard {
    registry: ProcessRegistry,
    name: Name,
}

impl RegistrationGuard {
    /// Name this guard owns.
    pub fn name(&self) -> &Name {
        &self.name
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        // The binding may have been replaced explicitly; ignore missing.
        let _ = self.registry.unregister(&self.name);
    }
}
