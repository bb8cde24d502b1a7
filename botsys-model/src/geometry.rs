//! Geometric primitives shared by the description and the message fabric.
//!
//! These are plain data carriers in SI base units (metres, radians, kg).
//! Kinematics math (transform composition, IK) is outside this crate; the
//! only computation here is construction-time validation.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Tolerance for unit-norm checks on axes and quaternions.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Three-component vector (metres or unit direction, context dependent).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Construct from components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// All-zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Whether the norm is within [`UNIT_NORM_TOLERANCE`] of one.
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }

    /// Return the vector scaled to unit norm, or `None` for a zero vector.
    pub fn normalized(&self) -> Option<Self> {
        let n = self.norm();
        if n == 0.0 {
            return None;
        }
        Some(Self::new(self.x / n, self.y / n, self.z / n))
    }
}

/// Orientation quaternion (w last matches no convention on purpose: fields
/// are named, not positional).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
    /// Scalar component.
    pub w: f64,
}

impl Quaternion {
    /// Construct from components.
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Whether the norm is within [`UNIT_NORM_TOLERANCE`] of one.
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Fixed rotation expressed as roll/pitch/yaw in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rpy {
    /// Rotation about X (rad).
    pub roll: f64,
    /// Rotation about Y (rad).
    pub pitch: f64,
    /// Rotation about Z (rad).
    pub yaw: f64,
}

impl Rpy {
    /// Construct from components (radians).
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }
}

/// Rigid transform: translation plus fixed rotation. Used for joint-local
/// origins and geometry offsets.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Translation in metres.
    pub translation: Vec3,
    /// Rotation as roll/pitch/yaw in radians.
    pub rotation: Rpy,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Rpy::default(),
        }
    }
}

/// Visual or collision geometry attached to a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    /// Axis-aligned box with full extents in metres.
    Box {
        /// Extents along x/y/z.
        size: Vec3,
    },
    /// Cylinder along Z.
    Cylinder {
        /// Radius in metres.
        radius: f64,
        /// Length in metres.
        length: f64,
    },
    /// Sphere.
    Sphere {
        /// Radius in metres.
        radius: f64,
    },
    /// External mesh, consumed by the (out-of-scope) mesh loader.
    Mesh {
        /// Resource path.
        path: String,
        /// Per-axis scale factors.
        scale: Vec3,
    },
}

/// Geometry with its offset from the owning link frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Shape.
    pub kind: GeometryKind,
    /// Offset from the link frame.
    pub origin: Transform,
}

/// Mass properties of a link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inertial {
    /// Mass in kilograms.
    pub mass: f64,
    /// Centre of mass in the link frame (metres).
    pub centre_of_mass: Vec3,
    /// Row-major 3x3 inertia tensor about the centre of mass (kg·m²).
    pub inertia: [[f64; 3]; 3],
}

/// Convert degrees to radians (descriptions are stored normalised to SI).
pub fn deg_to_rad(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_checks() {
        assert!(Vec3::new(0.0, 0.0, 1.0).is_unit());
        assert!(!Vec3::new(0.0, 0.0, 2.0).is_unit());
        assert!(Quaternion::identity().is_unit());
        assert!(!Quaternion::new(0.5, 0.0, 0.0, 1.0).is_unit());
    }

    #[test]
    fn test_normalized() {
        let v = Vec3::new(0.0, 3.0, 4.0).normalized().unwrap();
        assert!((v.norm() - 1.0).abs() < 1e-12);
        assert!(Vec3::zero().normalized().is_none());
    }

    #[test]
    fn test_deg_to_rad() {
        assert!((deg_to_rad(180.0) - std::f64::consts::PI).abs() < 1e-12);
    }
}
