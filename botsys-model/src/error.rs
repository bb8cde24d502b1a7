//! Error types for robot description construction and validation.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::name::Name;

/// Errors raised while building or validating a robot description.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The same name was declared twice in any category. Names are unique
    /// across links, joints, sensors, actuators, controllers, bridges, and
    /// commands.
    #[error("duplicate name '{0}'")]
    DuplicateName(Name),

    /// A joint, device, or command referenced a name that was never declared.
    #[error("unknown reference '{reference}' in {context}")]
    UnknownReference {
        /// The missing name.
        reference: Name,
        /// Where it was referenced from.
        context: String,
    },

    /// The link/joint graph has no root, more than one root, or a cycle.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A joint declaration is internally inconsistent (bad limits, zero
    /// axis, missing limits on a limited kind).
    #[error("invalid joint '{joint}': {reason}")]
    InvalidJoint {
        /// Offending joint.
        joint: Name,
        /// What is wrong with it.
        reason: String,
    },

    /// A link declaration is internally inconsistent.
    #[error("invalid link '{link}': {reason}")]
    InvalidLink {
        /// Offending link.
        link: Name,
        /// What is wrong with it.
        reason: String,
    },

    /// A schema fragment is incoherent (bounds inverted, default invalid,
    /// bounds on a non-numeric type).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A command declaration is inconsistent (empty allowed states, unknown
    /// state, zero category limit).
    #[error("invalid command '{command}': {reason}")]
    InvalidCommand {
        /// Offending command.
        command: Name,
        /// What is wrong with it.
        reason: String,
    },

    /// An operational state declaration clashes with a built-in state.
    #[error("invalid state declaration: {0}")]
    InvalidState(String),
}
