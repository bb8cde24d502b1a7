//! Category table: concurrency limits and live sets.
//!
//! The invariant the table guards: at every instant, the number of live
//! commands in a category never exceeds the category's limit. The engine
//! serialises admission through one lock around this table.

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use botsys_model::{Category, Name};

use crate::util::ExecutionId;

/// Live-set bookkeeping per category.
#[derive(Debug)]
pub struct CategoryTable {
    limits: HashMap<Name, usize>,
    /// Live executions per category, oldest first.
    live: HashMap<Name, Vec<ExecutionId>>,
}

impl CategoryTable {
    /// Build from the declared categories.
    pub fn new(categories: &[Category]) -> Self {
        let limits = categories
            .iter()
            .map(|c| (c.name.clone(), c.limit))
            .collect();
        Self {
            limits,
            live: HashMap::new(),
        }
    }

    /// Declared limit of a category.
    pub fn limit(&self, category: &Name) -> Option<usize> {
        self.limits.get(category).copied()
    }

    /// Live executions in a category, oldest first.
    pub fn live(&self, category: &Name) -> &[ExecutionId] {
        self.live.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the category has room for one more execution.
    pub fn has_room(&self, category: &Name) -> bool {
        match self.limit(category) {
            Some(limit) => self.live(category).len() < limit,
            None => false,
        }
    }

    /// Admit an execution. The caller must have checked `has_room`; this
    /// enforces it again and refuses over-admission.
    pub fn admit(&mut self, category: &Name, execution: ExecutionId) -> bool {
        if !self.has_room(category) {
            return false;
        }
        self.live.entry(category.clone()).or_default().push(execution);
        true
    }

    /// Release an execution from its category.
    pub fn release(&mut self, category: &Name, execution: &ExecutionId) {
        if let Some(entries) = self.live.get_mut(category) {
            entries.retain(|id| id != execution);
        }
    }

    /// `(current, limit)` per category, for introspection.
    pub fn availability(&self) -> HashMap<Name, (usize, usize)> {
        self.limits
            .iter()
            .map(|(name, limit)| (name.clone(), (self.live(name).len(), *limit)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CategoryTable {
        CategoryTable::new(&[
            Category::new("default", 1),
            Category::new("motion", 2),
        ])
    }

    #[test]
    fn test_admission_respects_limit() {
        let mut table = table();
        let motion = Name::new("motion");
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        let c = ExecutionId::new();

        assert!(table.admit(&motion, a));
        assert!(table.admit(&motion, b));
        assert!(!table.admit(&motion, c));
        assert_eq!(table.live(&motion), &[a, b]);
    }

    #[test]
    fn test_release_frees_room() {
        let mut table = table();
        let motion = Name::new("motion");
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        let c = ExecutionId::new();

        table.admit(&motion, a);
        table.admit(&motion, b);
        table.release(&motion, &a);
        assert!(table.admit(&motion, c));
        // Oldest-first order maintained
        assert_eq!(table.live(&motion), &[b, c]);
    }

    #[test]
    fn test_unknown_category_has_no_room() {
        let mut table = table();
        assert!(!table.has_room(&Name::new("warp")));
        assert!(!table.admit(&Name::new("warp"), ExecutionId::new()));
    }

    #[test]
    fn test_availability() {
        let mut table = table();
        table.admit(&Name::new("motion"), ExecutionId::new());
        let availability = table.availability();
        assert_eq!(availability[&Name::new("motion")], (1, 2));
        assert_eq!(availability[&Name::new("default")], (0, 1));
    }
}
