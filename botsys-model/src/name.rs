//! Interned-style names for robot entities.
//!
//! Every link, joint, sensor, actuator, controller, bridge, command,
//! operational state, and frame is identified by a [`Name`]. Names are
//! cheap to clone (`Arc<str>` internally) and compare by content.

// Layer 1: Standard library imports
use std::borrow::Borrow;
use std::fmt::{self, Display};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Cheap, content-comparable identifier used throughout the robot model.
///
/// # Examples
///
/// ```rust
/// use botsys_model::Name;
///
/// let pan = Name::new("pan");
/// let clone = pan.clone(); // Arc clone, no allocation
/// assert_eq!(pan, clone);
/// assert_eq!(pan.as_str(), "pan");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(Arc<str>);

impl Name {
    /// Create a name from any string-like value.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// View the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new("")
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
