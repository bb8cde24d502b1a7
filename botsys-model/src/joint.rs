//! Joint declarations: constrained connections between two links.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::error::ModelError;
use crate::geometry::{Transform, Vec3};
use crate::name::Name;

/// Motion class of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    /// Rotational with position limits.
    Revolute,
    /// Rotational without limits.
    Continuous,
    /// Linear with position limits.
    Prismatic,
    /// Rigid connection; carries no state.
    Fixed,
    /// Six degrees of freedom.
    Floating,
    /// Motion in a plane.
    Planar,
}

impl JointKind {
    /// Whether this kind requires position limits.
    pub fn requires_limits(&self) -> bool {
        matches!(self, JointKind::Revolute | JointKind::Prismatic)
    }

    /// Whether this kind carries a movable position at all.
    pub fn is_actuated(&self) -> bool {
        !matches!(self, JointKind::Fixed)
    }
}

impl Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JointKind::Revolute => "revolute",
            JointKind::Continuous => "continuous",
            JointKind::Prismatic => "prismatic",
            JointKind::Fixed => "fixed",
            JointKind::Floating => "floating",
            JointKind::Planar => "planar",
        };
        f.write_str(s)
    }
}

/// Motion limits in SI units (rad or m for position, N·m or N for effort,
/// rad/s or m/s for velocity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    /// Lower position bound.
    pub lower: f64,
    /// Upper position bound.
    pub upper: f64,
    /// Maximum absolute effort.
    pub effort: f64,
    /// Maximum absolute velocity.
    pub velocity: f64,
}

impl JointLimits {
    /// Symmetric position limits with the given effort/velocity caps.
    pub fn symmetric(half_range: f64, effort: f64, velocity: f64) -> Self {
        Self {
            lower: -half_range,
            upper: half_range,
            effort,
            velocity,
        }
    }

    /// Whether `position` lies within the position bounds (inclusive).
    pub fn contains(&self, position: f64) -> bool {
        position >= self.lower && position <= self.upper
    }

    fn check(&self, joint: &Name) -> Result<(), ModelError> {
        if self.lower > self.upper {
            return Err(ModelError::InvalidJoint {
                joint: joint.clone(),
                reason: format!("lower limit {} exceeds upper {}", self.lower, self.upper),
            });
        }
        if self.effort <= 0.0 || self.velocity <= 0.0 {
            return Err(ModelError::InvalidJoint {
                joint: joint.clone(),
                reason: "effort and velocity limits must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// A constrained connection between a parent and a child link.
///
/// Joints are immutable once the description is built; runtime joint state
/// (position/velocity/effort) lives in the robot state, keyed by the joint
/// name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    /// Unique joint name.
    pub name: Name,
    /// Motion class.
    pub kind: JointKind,
    /// Parent link name.
    pub parent_link: Name,
    /// Child link name.
    pub child_link: Name,
    /// Motion axis, unit direction in the joint frame.
    pub axis: Vec3,
    /// Joint-local origin transform relative to the parent link frame.
    pub origin: Transform,
    /// Motion limits; required for revolute and prismatic kinds.
    pub limits: Option<JointLimits>,
}

impl Joint {
    /// Validate internal consistency (axis, limits presence, limit sanity).
    ///
    /// Cross-reference checks (parent/child links exist) belong to the
    /// topology builder.
    pub fn check(&self) -> Result<(), ModelError> {
        if self.kind.is_actuated() && !self.axis.is_unit() {
            return Err(ModelError::InvalidJoint {
                joint: self.name.clone(),
                reason: format!("axis must be a unit vector, norm is {}", self.axis.norm()),
            });
        }
        if self.parent_link == self.child_link {
            return Err(ModelError::InvalidJoint {
                joint: self.name.clone(),
                reason: "parent and child link are the same".to_string(),
            });
        }
        match (&self.limits, self.kind.requires_limits()) {
            (None, true) => Err(ModelError::InvalidJoint {
                joint: self.name.clone(),
                reason: format!("{} joints require limits", self.kind),
            }),
            (Some(limits), _) => limits.check(&self.name),
            (None, false) => Ok(()),
        }
    }
}
