//! Joint positions, velocities, and efforts for one robot.
//!
//! Single-writer discipline: mutation methods are crate-private and called
//! only by the runtime; everyone else reads. Readers take an `Arc`
//! snapshot that is swapped atomically, so a snapshot taken during a batch
//! write never shows half the batch.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;
use thiserror::Error;

// Layer 3: Internal module imports
use botsys_model::{Name, RobotDescription};

/// State of one joint at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointSnapshot {
    /// Position (rad or m).
    pub position: f64,
    /// Velocity (rad/s or m/s), when known.
    pub velocity: Option<f64>,
    /// Effort (N·m or N), when known.
    pub effort: Option<f64>,
}

/// Robot-state mutation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// The joint is not in the description.
    #[error("unknown joint '{0}'")]
    UnknownJoint(Name),
    /// The joint is fixed and carries no state.
    #[error("joint '{0}' is fixed and has no state")]
    NotActuated(Name),
    /// The position violates the joint's declared limits.
    #[error("position {position} outside limits [{lower}, {upper}] of joint '{joint}'")]
    LimitExceeded {
        /// Offending joint.
        joint: Name,
        /// Requested position.
        position: f64,
        /// Declared lower bound.
        lower: f64,
        /// Declared upper bound.
        upper: f64,
    },
}

struct Inner {
    description: Arc<RobotDescription>,
    /// Swapped wholesale on every write; readers clone the Arc.
    snapshot: RwLock<Arc<HashMap<Name, JointSnapshot>>>,
    respect_limits: bool,
}

/// Shared joint-state table.
///
/// Cheap to clone; all clones read the same table. Positions start at 0.0
/// for every actuated joint.
#[derive(Clone)]
pub struct RobotState {
    inner: Arc<Inner>,
}

impl RobotState {
    /// Create the state table for a description, zero-initialised.
    pub fn new(description: Arc<RobotDescription>, respect_limits: bool) -> Self {
        let mut initial = HashMap::new();
        for joint in description.actuated_joints() {
            // Start inside the limits when zero is not a legal position.
            let position = match &joint.limits {
                Some(limits) if !limits.contains(0.0) => limits.lower,
                _ => 0.0,
            };
            initial.insert(
                joint.name.clone(),
                JointSnapshot {
                    position,
                    velocity: None,
                    effort: None,
                },
            );
        }
        Self {
            inner: Arc::new(Inner {
                description,
                snapshot: RwLock::new(Arc::new(initial)),
                respect_limits,
            }),
        }
    }

    /// Consistent snapshot of every joint. The returned map never changes
    /// under the caller.
    pub fn snapshot(&self) -> Arc<HashMap<Name, JointSnapshot>> {
        Arc::clone(&self.inner.snapshot.read())
    }

    /// State of one joint.
    pub fn get(&self, joint: &Name) -> Option<JointSnapshot> {
        self.inner.snapshot.read().get(joint).copied()
    }

    /// Position of one joint.
    pub fn position(&self, joint: &Name) -> Option<f64> {
        self.get(joint).map(|state| state.position)
    }

    fn check(&self, joint: &Name, position: f64) -> Result<(), StateError> {
        let decl = self
            .inner
            .description
            .joints()
            .get(joint)
            .ok_or_else(|| StateError::UnknownJoint(joint.clone()))?;
        if !decl.kind.is_actuated() {
            return Err(StateError::NotActuated(joint.clone()));
        }
        if self.inner.respect_limits {
            if let Some(limits) = &decl.limits {
                if !limits.contains(position) {
                    return Err(StateError::LimitExceeded {
                        joint: joint.clone(),
                        position,
                        lower: limits.lower,
                        upper: limits.upper,
                    });
                }
            }
        }
        Ok(())
    }

    /// Write one joint position (runtime only).
    pub(crate) fn set_position(&self, joint: &Name, position: f64) -> Result<(), StateError> {
        self.set_many(vec![(joint.clone(), position)])
    }

    /// Batch write (runtime only): validate everything, then swap the
    /// snapshot once, so readers never observe a partial batch.
    pub(crate) fn set_many(&self, updates: Vec<(Name, f64)>) -> Result<(), StateError> {
        for (joint, position) in &updates {
            self.check(joint, *position)?;
        }
        let mut guard = self.inner.snapshot.write();
        let mut next = (**guard).clone();
        for (joint, position) in updates {
            let entry = next.entry(joint).or_default();
            entry.position = position;
        }
        *guard = Arc::new(next);
        Ok(())
    }

    /// Batch write of velocities/efforts from feedback (runtime only).
    pub(crate) fn set_dynamics(
        &self,
        updates: Vec<(Name, Option<f64>, Option<f64>)>,
    ) -> Result<(), StateError> {
        for (joint, _, _) in &updates {
            if !self.inner.snapshot.read().contains_key(joint) {
                return Err(StateError::UnknownJoint(joint.clone()));
            }
        }
        let mut guard = self.inner.snapshot.write();
        let mut next = (**guard).clone();
        for (joint, velocity, effort) in updates {
            if let Some(entry) = next.get_mut(&joint) {
                if velocity.is_some() {
                    entry.velocity = velocity;
                }
                if effort.is_some() {
                    entry.effort = effort;
                }
            }
        }
        *guard = Arc::new(next);
        Ok(())
    }
}
