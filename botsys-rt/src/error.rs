//! Runtime error taxonomy.
//!
//! Every error the runtime surfaces carries an [`ErrorKind`] with a fixed
//! [`Severity`] mapping. Errors are returned as values to the immediate
//! caller; diagnostics (`[diagnostic]` events) inform observers separately
//! and never replace the returned error.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Continue; the operation degraded but nothing is at risk.
    Warning,
    /// The operation failed; callers may retry or degrade.
    Error,
    /// Immediate safety action is required.
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Classification of runtime failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Communication failure with a device.
    Hardware,
    /// Limit exceeded or unsafe transition.
    Safety,
    /// Unreachable target, solver non-convergence.
    Kinematics,
    /// Configuration or schema violation.
    Invalid,
    /// Command issued in a disallowed operational state.
    State,
    /// Low-level framing or device-bus error.
    Protocol,
}

impl ErrorKind {
    /// Fixed severity mapping.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::Safety => Severity::Critical,
            ErrorKind::State => Severity::Warning,
            ErrorKind::Hardware
            | ErrorKind::Kinematics
            | ErrorKind::Invalid
            | ErrorKind::Protocol => Severity::Error,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Hardware => "hardware",
            ErrorKind::Safety => "safety",
            ErrorKind::Kinematics => "kinematics",
            ErrorKind::Invalid => "invalid",
            ErrorKind::State => "state",
            ErrorKind::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

/// General-purpose runtime error: a kind plus a human-readable message.
///
/// Subsystems with richer structure (dispatch, parameters, safety) define
/// their own error enums and convert into `RuntimeError` at the API
/// boundary where a uniform type is needed (device drivers, bridges).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct RuntimeError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl RuntimeError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Device communication failure.
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Hardware, message)
    }

    /// Limit exceeded or unsafe transition.
    pub fn safety(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Safety, message)
    }

    /// Unreachable target or solver failure.
    pub fn kinematics(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Kinematics, message)
    }

    /// Configuration or schema violation.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    /// Operation attempted in a disallowed operational state.
    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }

    /// Low-level framing or bus error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// The severity implied by the kind.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}
