// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Unique token identifying one command execution.
///
/// Every dispatched command gets a fresh execution id; it keys the category
/// live-sets, the result cache, and the parameter-to-command index.
///
/// # Example
/// ```rust
/// use botsys_rt::util::ExecutionId;
///
/// let id1 = ExecutionId::new();
/// let id2 = ExecutionId::new();
/// assert_ne!(id1, id2); // Globally unique
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generate a new random ExecutionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create ExecutionId from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pub/sub subscription.
///
/// # Example
/// ```rust
/// use botsys_rt::util::SubscriptionId;
///
/// let id = SubscriptionId::new();
/// println!("Subscription: {id}");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a new random SubscriptionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create SubscriptionId from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
