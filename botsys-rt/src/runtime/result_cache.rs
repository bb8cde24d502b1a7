//! Post-termination result retention.
//!
//! When a command terminates, its result is cached for a retention window
//! so that concurrent and late awaiters can still recover it after the
//! actor is gone. Within the window every caller sees the same result;
//! after it, the entry is swept and late callers get a recovery failure.

// Layer 1: Standard library imports
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
use crate::runtime::command::CommandResult;
use crate::util::ExecutionId;

struct CachedResult {
    result: CommandResult,
    stored_at: Instant,
}

/// Retention-windowed result cache.
#[derive(Default)]
pub struct ResultCache {
    entries: DashMap<ExecutionId, CachedResult>,
    retention: Option<Duration>,
}

impl ResultCache {
    /// Create with the given retention window. `None` retains forever
    /// (tests only; the engine always configures a window).
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// Store a result, sweeping expired entries opportunistically.
    pub fn insert(&self, execution: ExecutionId, result: CommandResult) {
        self.sweep();
        self.entries.insert(
            execution,
            CachedResult {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fetch a result. Entries stay until retention expiry so concurrent
    /// awaiters all observe the same value.
    pub fn get(&self, execution: &ExecutionId) -> Option<CommandResult> {
        let expired = match self.entries.get(execution) {
            None => return None,
            Some(entry) => match self.retention {
                Some(window) => entry.stored_at.elapsed() > window,
                None => false,
            },
        };
        if expired {
            self.entries.remove(execution);
            return None;
        }
        self.entries
            .get(execution)
            .map(|entry| entry.result.clone())
    }

    /// Whether a live (unexpired) entry exists.
    pub fn contains(&self, execution: &ExecutionId) -> bool {
        self.get(execution).is_some()
    }

    fn sweep(&self) {
        if let Some(window) = self.retention {
            self.entries
                .retain(|_, entry| entry.stored_at.elapsed() <= window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::command::{CommandError, CommandValue};
    use botsys_model::Value;

    fn ok_result() -> CommandResult {
        Ok(CommandValue {
            value: Value::Str("done".into()),
            next_state: None,
        })
    }

    #[test]
    fn test_concurrent_readers_see_same_result() {
        let cache = ResultCache::new(Some(Duration::from_secs(30)));
        let id = ExecutionId::new();
        cache.insert(id, ok_result());

        // Reads do not consume the entry
        assert!(cache.get(&id).is_some());
        assert!(cache.get(&id).is_some());
    }

    #[test]
    fn test_missing_entry() {
        let cache = ResultCache::new(Some(Duration::from_secs(30)));
        assert!(cache.get(&ExecutionId::new()).is_none());
    }

    #[test]
    fn test_expired_entry_swept() {
        let cache = ResultCache::new(Some(Duration::from_millis(0)));
        let id = ExecutionId::new();
        cache.insert(id, Err(CommandError::Cancelled));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&id).is_none());
    }

    #[test]
    fn test_unbounded_retention() {
        let cache = ResultCache::new(None);
        let id = ExecutionId::new();
        cache.insert(id, ok_result());
        assert!(cache.contains(&id));
    }
}
