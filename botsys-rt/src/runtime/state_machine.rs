//! Operational-state machine.
//!
//! States come from the description (built-ins `disarmed`/`idle` plus user
//! states); the initial state is `disarmed`. Transitions happen only as a
//! side effect of commands: a `next_state` in a command result or an
//! explicit `transition_state` call mid-command.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use botsys_model::Name;

use crate::message::Transition;

/// State-machine failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMachineError {
    /// The target state was never declared.
    #[error("unknown operational state '{0}'")]
    UnknownState(Name),
}

/// Tracks the current operational state over the declared state set.
#[derive(Debug, Clone)]
pub struct StateMachine {
    states: Vec<Name>,
    current: Name,
}

impl StateMachine {
    /// Create over the declared states, starting at `initial`.
    pub fn new(states: Vec<Name>, initial: Name) -> Result<Self, StateMachineError> {
        if !states.contains(&initial) {
            return Err(StateMachineError::UnknownState(initial));
        }
        Ok(Self {
            states,
            current: initial,
        })
    }

    /// The current state.
    pub fn current(&self) -> &Name {
        &self.current
    }

    /// Whether `state` is declared.
    pub fn is_declared(&self, state: &Name) -> bool {
        self.states.contains(state)
    }

    /// Transition to `target`, returning the recorded transition.
    ///
    /// Self-transitions are recorded like any other; the caller decides
    /// whether to publish them.
    pub fn transition(&mut self, target: Name) -> Result<Transition, StateMachineError> {
        if !self.is_declared(&target) {
            return Err(StateMachineError::UnknownState(target));
        }
        let from = std::mem::replace(&mut self.current, target.clone());
        Ok(Transition { from, to: target })
    }
}
