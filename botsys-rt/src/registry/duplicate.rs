//! Duplicate-keyspace registry: many values per key.
//!
//! Backs the pub/sub router's subscription table, where any number of
//! subscribers share a path prefix. Unlike the unique keyspace, inserting
//! under an occupied key appends.

// Layer 1: Standard library imports
use std::hash::Hash;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
// (none)

/// Concurrent multimap with lock-free reads.
///
/// Cheap to clone; all clones share the same table. Values are stored in
/// insertion order per key.
pub struct DuplicateRegistry<K: Eq + Hash, V> {
    table: Arc<DashMap<K, Vec<V>>>,
}

impl<K: Eq + Hash, V> Clone for DuplicateRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K: Eq + Hash, V> Default for DuplicateRegistry<K, V> {
    fn default() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> DuplicateRegistry<K, V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `key`.
    pub fn register(&self, key: K, value: V) {
        self.table.entry(key).or_default().push(value);
    }

    /// Remove every value under `key` matching the predicate. Empty keys
    /// are dropped from the table. Returns how many values were removed.
    pub fn remove_where<F: Fn(&V) -> bool>(&self, key: &K, predicate: F) -> usize {
        let mut removed = 0;
        if let Some(mut entry) = self.table.get_mut(key) {
            let before = entry.len();
            entry.retain(|v| !predicate(v));
            removed = before - entry.len();
        }
        self.table.remove_if(key, |_, values| values.is_empty());
        removed
    }

    /// Snapshot of the values under `key`, in insertion order.
    pub fn get(&self, key: &K) -> Vec<V> {
        self.table
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of every `(key, values)` pair.
    pub fn entries(&self) -> Vec<(K, Vec<V>)> {
        self.table
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Visit every `(key, values)` pair without cloning the values.
    pub fn for_each<F: FnMut(&K, &[V])>(&self, mut visit: F) {
        for entry in self.table.iter() {
            visit(entry.key(), entry.value());
        }
    }

    /// Number of keys with at least one value.
    pub fn key_count(&self) -> usize {
        self.table.len()
    }
}
