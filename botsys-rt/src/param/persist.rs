//! Durable parameter storage.
//!
//! The registry invokes `save` on each successful write and `load` once at
//! startup; loaded values override declaration defaults. The file backend
//! keeps a single JSON object keyed by dotted parameter paths and writes
//! it atomically (temp file + rename).

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tracing::warn;

// Layer 3: Internal module imports
use botsys_model::{Path, Value};

use crate::error::RuntimeError;

/// Durable key-value backend for parameter values.
pub trait ParamStore: Send + Sync {
    /// Persist one value. Called after each successful write.
    fn save(&self, path: &Path, value: &Value) -> Result<(), RuntimeError>;

    /// Load every persisted value. Called once at startup.
    fn load(&self) -> Result<Vec<(Path, Value)>, RuntimeError>;
}

/// JSON-file parameter store.
///
/// Layout: one JSON object mapping dotted paths (`pid.kp`) to values.
/// Writes go through a temp file and a rename so a crash never leaves a
/// half-written store behind.
pub struct FileParamStore {
    file: PathBuf,
    /// In-memory mirror so each save rewrites the full object without
    /// re-reading the file.
    cache: Mutex<BTreeMap<String, Value>>,
}

impl FileParamStore {
    /// Open (or create) a store at `file`.
    pub fn open(file: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let file = file.into();
        let cache = match fs::read_to_string(&file) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                RuntimeError::invalid(format!(
                    "parameter store {} is corrupt: {e}",
                    file.display()
                ))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(RuntimeError::protocol(format!(
                    "cannot read parameter store {}: {err}",
                    file.display()
                )))
            }
        };
        Ok(Self {
            file,
            cache: Mutex::new(cache),
        })
    }

    fn flush(&self, snapshot: &BTreeMap<String, Value>) -> Result<(), RuntimeError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| RuntimeError::invalid(format!("cannot encode parameter store: {e}")))?;

        let tmp = self.file.with_extension("tmp");
        let mut out = fs::File::create(&tmp).map_err(|e| {
            RuntimeError::protocol(format!("cannot create {}: {e}", tmp.display()))
        })?;
        out.write_all(json.as_bytes())
            .and_then(|()| out.sync_all())
            .map_err(|e| RuntimeError::protocol(format!("cannot write {}: {e}", tmp.display())))?;
        drop(out);

        fs::rename(&tmp, &self.file).map_err(|e| {
            RuntimeError::protocol(format!("cannot replace {}: {e}", self.file.display()))
        })
    }
}

impl ParamStore for FileParamStore {
    fn save(&self, path: &Path, value: &Value) -> Result<(), RuntimeError> {
        let mut cache = self.cache.lock();
        cache.insert(path.storage_key(), value.clone());
        self.flush(&cache)
    }

    fn load(&self) -> Result<Vec<(Path, Value)>, RuntimeError> {
        let cache = self.cache.lock();
        Ok(cache
            .iter()
            .map(|(key, value)| (Path::from_storage_key(key), value.clone()))
            .collect())
    }
}

/// In-memory store for tests and simulation runs without durability.
#[derive(Default)]
pub struct MemoryParamStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryParamStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParamStore for MemoryParamStore {
    fn save(&self, path: &Path, value: &Value) -> Result<(), RuntimeError> {
        self.values.lock().insert(path.storage_key(), value.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<(Path, Value)>, RuntimeError> {
        Ok(self
            .values
            .lock()
            .iter()
            .map(|(key, value)| (Path::from_storage_key(key), value.clone()))
            .collect())
    }
}

/// Log-and-continue wrapper used by the registry: persistence problems
/// must not fail an otherwise committed write.
pub(crate) fn save_best_effort(store: &dyn ParamStore, path: &Path, value: &Value) {
    if let Err(err) = store.save(path, value) {
        warn!(%path, error = %err, "parameter persistence failed");
    }
}
