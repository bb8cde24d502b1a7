//! Command and operational-state declarations.
//!
//! A command declaration names a handler type, the operational states it
//! may run in, its concurrency category, and the cancellation scope applied
//! when its category is full. The handler implementation itself lives in
//! the runtime crate; the description only carries the contract.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::error::ModelError;
use crate::name::Name;
use crate::path::Path;
use crate::schema::Schema;

/// Built-in operational state: safety off, no command with hardware side
/// effects may run.
pub const STATE_DISARMED: &str = "disarmed";

/// Built-in operational state: armed and ready.
pub const STATE_IDLE: &str = "idle";

/// Built-in command that transitions `disarmed -> idle` through the safety
/// controller.
pub const COMMAND_ARM: &str = "arm";

/// Built-in command that disarms from any state.
pub const COMMAND_DISARM: &str = "disarm";

/// Default category assigned to commands that do not declare one.
pub const DEFAULT_CATEGORY: &str = "default";

/// What a command may cancel when its category is at capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelScope {
    /// Never cancel; dispatch is rejected when the category is full.
    None,
    /// Cancel running commands in the listed categories, oldest first,
    /// until there is room.
    Categories(Vec<Name>),
    /// Cancel every running command first.
    All,
}

impl Default for CancelScope {
    fn default() -> Self {
        CancelScope::None
    }
}

/// Concurrency category: running commands of a category never exceed its
/// limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category name.
    pub name: Name,
    /// Maximum concurrently running commands.
    pub limit: usize,
}

impl Category {
    /// Create a category with the given limit.
    pub fn new(name: impl Into<Name>, limit: usize) -> Self {
        Self {
            name: name.into(),
            limit,
        }
    }
}

/// Declaration of a runnable command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDecl {
    /// Unique command name; also the dispatch key.
    pub name: Name,
    /// Handler type key resolved against the handler bindings at start.
    pub handler: Name,
    /// Operational states in which dispatch is accepted.
    pub allowed_states: Vec<Name>,
    /// Concurrency category (defaults to [`DEFAULT_CATEGORY`], limit 1).
    pub category: Name,
    /// Cancellation scope consulted when the category is at capacity.
    pub cancel: CancelScope,
    /// Contract the goal arguments must satisfy; defaults applied.
    pub goal_schema: Schema,
    /// Options sourced from runtime parameters: `(option, parameter path)`.
    /// A bound option tracks its parameter while the command runs.
    pub param_options: Vec<(Name, Path)>,
}

impl CommandDecl {
    /// Create a declaration with the default category and no cancellation.
    pub fn new(name: impl Into<Name>, handler: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            allowed_states: vec![Name::new(STATE_IDLE)],
            category: Name::new(DEFAULT_CATEGORY),
            cancel: CancelScope::None,
            goal_schema: Schema::new(),
            param_options: Vec::new(),
        }
    }

    /// Builder: replace the allowed states.
    pub fn allowed_in<I, N>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Name>,
    {
        self.allowed_states = states.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: assign a category.
    pub fn in_category(mut self, category: impl Into<Name>) -> Self {
        self.category = category.into();
        self
    }

    /// Builder: set the cancellation scope.
    pub fn with_cancel(mut self, cancel: CancelScope) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builder: set the goal schema.
    pub fn with_goal_schema(mut self, schema: Schema) -> Self {
        self.goal_schema = schema;
        self
    }

    /// Builder: source option `option` from the parameter at `path`.
    pub fn bind_option(mut self, option: impl Into<Name>, path: Path) -> Self {
        self.param_options.push((option.into(), path));
        self
    }

    /// Validate against the declared operational states and categories.
    pub fn check(&self, states: &[Name], categories: &[Category]) -> Result<(), ModelError> {
        if self.allowed_states.is_empty() {
            return Err(ModelError::InvalidCommand {
                command: self.name.clone(),
                reason: "allowed_states is empty".to_string(),
            });
        }
        for state in &self.allowed_states {
            if !states.contains(state) {
                return Err(ModelError::InvalidCommand {
                    command: self.name.clone(),
                    reason: format!("unknown operational state '{state}'"),
                });
            }
        }
        if !categories.iter().any(|c| c.name == self.category) {
            return Err(ModelError::InvalidCommand {
                command: self.name.clone(),
                reason: format!("unknown category '{}'", self.category),
            });
        }
        if let CancelScope::Categories(names) = &self.cancel {
            for name in names {
                if !categories.iter().any(|c| &c.name == name) {
                    return Err(ModelError::InvalidCommand {
                        command: self.name.clone(),
                        reason: format!("cancel scope references unknown category '{name}'"),
                    });
                }
            }
        }
        for (option, path) in &self.param_options {
            if self.goal_schema.get(option).is_none() {
                return Err(ModelError::InvalidCommand {
                    command: self.name.clone(),
                    reason: format!(
                        "option '{option}' bound to parameter {path} is not in the goal schema"
                    ),
                });
            }
        }
        self.goal_schema.check()?;
        Ok(())
    }
}

/// Display form used in dispatch errors.
impl Display for CommandDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (category {})", self.name, self.category)
    }
}
