//! The in-memory parameter registry.
//!
//! Path-keyed schema+value table with validated writes, atomic batches,
//! change events on `[param | path]`, an optional durable backend, and
//! forwarding of remote-mirror operations to named bridges.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

// Layer 3: Internal module imports
use botsys_model::{Name, Path, Schema, SchemaEntry, Value};

use crate::bridge::Bridge;
use crate::error::RuntimeError;
use crate::message::{ChangeSource, Envelope, ParameterChanged, Payload};
use crate::param::persist::{save_best_effort, ParamStore};
use crate::pubsub::PubSubRouter;

/// Parameter API failure.
#[derive(Debug, Error)]
pub enum ParamError {
    /// No parameter is registered at the path.
    #[error("parameter {0} not found")]
    NotFound(Path),
    /// One or more values failed schema validation; nothing was written.
    #[error("parameter validation failed for {} path(s)", failures.len())]
    Validation {
        /// Per-path rejection reasons.
        failures: Vec<(Path, String)>,
    },
    /// The named bridge is not registered.
    #[error("bridge '{0}' not found")]
    UnknownBridge(Name),
    /// A bridge or storage operation failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

struct ParamEntry {
    schema: SchemaEntry,
    value: Value,
}

struct Inner {
    /// Value table. A single RwLock (not a sharded map) so batch writes
    /// are atomic with respect to readers.
    table: RwLock<HashMap<Path, ParamEntry>>,
    pubsub: PubSubRouter,
    store: Option<Box<dyn ParamStore>>,
    bridges: DashMap<Name, Arc<dyn Bridge>>,
}

/// The per-robot parameter registry.
///
/// Cheap to clone; all clones share one table. Reads are direct (no actor
/// round-trip); writes validate against the stored schema first, so the
/// table never holds an invalid value.
#[derive(Clone)]
pub struct ParamRegistry {
    inner: Arc<Inner>,
}

/// Topic prefix for parameter change events.
fn param_topic(path: &Path) -> Path {
    Path::from(["param"]).concat(path)
}

impl ParamRegistry {
    /// Create a registry without durable storage.
    pub fn new(pubsub: PubSubRouter) -> Self {
        Self::with_store(pubsub, None)
    }

    /// Create a registry with an optional durable backend.
    pub fn with_store(pubsub: PubSubRouter, store: Option<Box<dyn ParamStore>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: RwLock::new(HashMap::new()),
                pubsub,
                store,
                bridges: DashMap::new(),
            }),
        }
    }

    /// Register a component schema: every entry is merged at
    /// `component ++ entry-name` with its declared default, and a change
    /// event with source `Init` is emitted per entry.
    ///
    /// Entries without a default are rejected: the table always holds a
    /// schema-valid value for every registered path.
    pub fn register(&self, component: &Path, schema: &Schema) -> Result<(), ParamError> {
        schema
            .check()
            .map_err(|e| ParamError::Validation {
                failures: vec![(component.clone(), e.to_string())],
            })?;

        let mut failures = Vec::new();
        let mut accepted: Vec<(Path, SchemaEntry, Value)> = Vec::new();
        for (name, entry) in schema.entries() {
            let path = component.join(name.clone());
            match &entry.default {
                Some(default) => accepted.push((path, entry.clone(), default.clone())),
                None => failures.push((path, "schema entry has no default".to_string())),
            }
        }
        if !failures.is_empty() {
            return Err(ParamError::Validation { failures });
        }

        let mut events = Vec::new();
        {
            let mut table = self.inner.table.write();
            for (path, entry, default) in accepted {
                // Re-registration keeps the current value when it still
                // validates against the (possibly updated) schema.
                let value = match table.get(&path) {
                    Some(existing) if entry.validate(&existing.value).is_ok() => {
                        existing.value.clone()
                    }
                    _ => default,
                };
                let old = table.get(&path).map(|e| e.value.clone());
                table.insert(
                    path.clone(),
                    ParamEntry {
                        schema: entry,
                        value: value.clone(),
                    },
                );
                events.push(ParameterChanged {
                    path,
                    old,
                    new: value,
                    source: ChangeSource::Init,
                });
            }
        }
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    /// Apply persisted values over declaration defaults. Called once at
    /// startup, after every component is registered.
    ///
    /// Values that no longer match a registered path or fail the current
    /// schema are skipped with a warning.
    pub fn load_persisted(&self) -> Result<usize, ParamError> {
        let Some(store) = self.inner.store.as_deref() else {
            return Ok(0);
        };
        let persisted = store.load().map_err(ParamError::Runtime)?;
        let mut applied = 0;
        for (path, value) in persisted {
            match self.set_with_source(&path, value, ChangeSource::Persisted) {
                Ok(()) => applied += 1,
                Err(err) => {
                    warn!(%path, error = %err, "skipping persisted parameter");
                }
            }
        }
        info!(applied, "persisted parameters loaded");
        Ok(applied)
    }

    /// Read a value. Direct table read, no actor round-trip.
    pub fn get(&self, path: &Path) -> Result<Value, ParamError> {
        let table = self.inner.table.read();
        table
            .get(path)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| ParamError::NotFound(path.clone()))
    }

    /// Write a value from the local API.
    pub fn set(&self, path: &Path, value: Value) -> Result<(), ParamError> {
        self.set_with_source(path, value, ChangeSource::Api)
    }

    /// Write a value, recording who caused it.
    pub fn set_with_source(
        &self,
        path: &Path,
        value: Value,
        source: ChangeSource,
    ) -> Result<(), ParamError> {
        let event = {
            let mut table = self.inner.table.write();
            let entry = table
                .get_mut(path)
                .ok_or_else(|| ParamError::NotFound(path.clone()))?;
            entry.schema.validate(&value).map_err(|reason| {
                ParamError::Validation {
                    failures: vec![(path.clone(), reason)],
                }
            })?;
            let old = Some(entry.value.clone());
            entry.value = value.clone();
            ParameterChanged {
                path: path.clone(),
                old,
                new: value,
                source,
            }
        };

        if let Some(store) = self.inner.store.as_deref() {
            save_best_effort(store, path, &event.new);
        }
        self.emit(event);
        Ok(())
    }

    /// Atomic batch write: validate everything first, then apply all or
    /// nothing. One change event per path on success.
    pub fn set_many(&self, updates: Vec<(Path, Value)>) -> Result<(), ParamError> {
        let mut events = Vec::with_capacity(updates.len());
        {
            let mut table = self.inner.table.write();

            // Phase 1: validate everything against current schemas.
            let mut failures = Vec::new();
            for (path, value) in &updates {
                match table.get(path) {
                    None => failures.push((path.clone(), "not found".to_string())),
                    Some(entry) => {
                        if let Err(reason) = entry.schema.validate(value) {
                            failures.push((path.clone(), reason));
                        }
                    }
                }
            }
            if !failures.is_empty() {
                return Err(ParamError::Validation { failures });
            }

            // Phase 2: apply while still holding the write lock, so no
            // reader observes a partial batch.
            for (path, value) in updates {
                if let Some(entry) = table.get_mut(&path) {
                    let old = Some(entry.value.clone());
                    entry.value = value.clone();
                    events.push(ParameterChanged {
                        path,
                        old,
                        new: value,
                        source: ChangeSource::Api,
                    });
                }
            }
        }

        for event in &events {
            if let Some(store) = self.inner.store.as_deref() {
                save_best_effort(store, &event.path, &event.new);
            }
        }
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    /// List `(path, schema)` metadata pairs under `prefix`, path-ordered.
    pub fn list(&self, prefix: &Path) -> Vec<(Path, SchemaEntry)> {
        let table = self.inner.table.read();
        let mut out: Vec<(Path, SchemaEntry)> = table
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, entry)| (path.clone(), entry.schema.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // ---- bridges -------------------------------------------------------

    /// Make a bridge addressable for remote-mirror operations.
    pub fn register_bridge(&self, name: Name, bridge: Arc<dyn Bridge>) {
        self.inner.bridges.insert(name, bridge);
    }

    /// Remove a bridge (its supervisor is shutting it down).
    pub fn unregister_bridge(&self, name: &Name) {
        self.inner.bridges.remove(name);
    }

    fn bridge(&self, name: &Name) -> Result<Arc<dyn Bridge>, ParamError> {
        self.inner
            .bridges
            .get(name)
            .map(|b| Arc::clone(b.value()))
            .ok_or_else(|| ParamError::UnknownBridge(name.clone()))
    }

    /// Enumerate remote parameters through the named bridge.
    pub async fn list_remote(
        &self,
        bridge: &Name,
    ) -> Result<Vec<crate::bridge::RemoteParam>, ParamError> {
        Ok(self.bridge(bridge)?.list_remote().await?)
    }

    /// Read one remote parameter through the named bridge.
    pub async fn get_remote(&self, bridge: &Name, id: &str) -> Result<Value, ParamError> {
        Ok(self.bridge(bridge)?.get_remote(id).await?)
    }

    /// Write one remote parameter through the named bridge.
    pub async fn set_remote(
        &self,
        bridge: &Name,
        id: &str,
        value: Value,
    ) -> Result<(), ParamError> {
        Ok(self.bridge(bridge)?.set_remote(id, value).await?)
    }

    /// Subscribe to one remote parameter through the named bridge.
    pub async fn subscribe_remote(&self, bridge: &Name, id: &str) -> Result<(), ParamError> {
        Ok(self.bridge(bridge)?.subscribe_remote(id).await?)
    }

    fn emit(&self, event: ParameterChanged) {
        let topic = param_topic(&event.path);
        match Envelope::new("param", Payload::ParameterChanged(event)) {
            Ok(envelope) => {
                self.inner.pubsub.publish(&topic, envelope);
            }
            Err(err) => warn!(error = %err, "dropping malformed parameter event"),
        }
    }
}
