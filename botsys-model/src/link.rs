//! Link declarations: rigid bodies in the topology.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::error::ModelError;
use crate::geometry::{Geometry, Inertial};
use crate::name::Name;

/// A rigid body. Exactly one link in a description is the root (no parent
/// joint); parent/child joint relations are computed by the topology
/// builder, not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Unique link name.
    pub name: Name,
    /// Optional mass properties.
    pub inertial: Option<Inertial>,
    /// Optional visual geometry.
    pub visual: Option<Geometry>,
    /// Optional collision geometry.
    pub collision: Option<Geometry>,
}

impl Link {
    /// Create a bare link with no inertial or geometry.
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            inertial: None,
            visual: None,
            collision: None,
        }
    }

    /// Builder: mass properties.
    pub fn with_inertial(mut self, inertial: Inertial) -> Self {
        self.inertial = Some(inertial);
        self
    }

    /// Builder: visual geometry.
    pub fn with_visual(mut self, visual: Geometry) -> Self {
        self.visual = Some(visual);
        self
    }

    /// Builder: collision geometry.
    pub fn with_collision(mut self, collision: Geometry) -> Self {
        self.collision = Some(collision);
        self
    }

    /// Validate internal consistency.
    pub fn check(&self) -> Result<(), ModelError> {
        if let Some(inertial) = &self.inertial {
            if inertial.mass <= 0.0 {
                return Err(ModelError::InvalidLink {
                    link: self.name.clone(),
                    reason: format!("mass must be positive, got {}", inertial.mass),
                });
            }
        }
        Ok(())
    }
}
