//! Pre-computed topology over the flat link/joint tables.
//!
//! Links and joints are stored flat and keyed by name; the tree itself is a
//! secondary table of parent/child relations, a breadth-first traversal
//! order, and a path index. Cross-references are names, never pointers, so
//! the recursive structure stays cycle-free by construction.

// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::error::ModelError;
use crate::joint::Joint;
use crate::name::Name;
use crate::path::Path;

/// Parent/child relations, traversal order, and path index for a validated
/// link/joint tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    root: Name,
    /// link -> the joint whose child it is (absent for the root)
    parent_joint: HashMap<Name, Name>,
    /// link -> joints whose parent it is, in declaration order
    child_joints: HashMap<Name, Vec<Name>>,
    /// links in breadth-first order starting at the root
    traversal: Vec<Name>,
    /// link -> topology path ([root, joint, link, joint, link, ...])
    link_paths: HashMap<Name, Path>,
    /// joint -> topology path ([root, ..., parent_link, joint])
    joint_paths: HashMap<Name, Path>,
}

impl Topology {
    /// Build and validate the topology from flat tables.
    ///
    /// Validates that every joint references declared links, that exactly
    /// one link has no parent joint (the root), that no link has two parent
    /// joints, and that every link is reachable from the root (no cycles,
    /// no orphans).
    pub fn build(link_names: &[Name], joints: &[Joint]) -> Result<Self, ModelError> {
        let mut parent_joint: HashMap<Name, Name> = HashMap::new();
        let mut child_joints: HashMap<Name, Vec<Name>> = HashMap::new();
        let mut joint_by_name: HashMap<Name, &Joint> = HashMap::new();

        for joint in joints {
            for link in [&joint.parent_link, &joint.child_link] {
                if !link_names.contains(link) {
                    return Err(ModelError::UnknownReference {
                        reference: link.clone(),
                        context: format!("joint '{}'", joint.name),
                    });
                }
            }
            if let Some(previous) = parent_joint.insert(joint.child_link.clone(), joint.name.clone())
            {
                return Err(ModelError::InvalidTopology(format!(
                    "link '{}' is the child of both '{}' and '{}'",
                    joint.child_link, previous, joint.name
                )));
            }
            child_joints
                .entry(joint.parent_link.clone())
                .or_default()
                .push(joint.name.clone());
            joint_by_name.insert(joint.name.clone(), joint);
        }

        let mut roots = link_names
            .iter()
            .filter(|link| !parent_joint.contains_key(*link));
        let root = match (roots.next(), roots.next()) {
            (Some(root), None) => root.clone(),
            (Some(a), Some(b)) => {
                return Err(ModelError::InvalidTopology(format!(
                    "multiple root links: '{a}' and '{b}'"
                )))
            }
            (None, _) => {
                return Err(ModelError::InvalidTopology(
                    "no root link (every link has a parent joint)".to_string(),
                ))
            }
        };

        // Breadth-first walk from the root, recording paths as we go.
        let mut traversal = Vec::with_capacity(link_names.len());
        let mut link_paths = HashMap::new();
        let mut joint_paths = HashMap::new();
        let mut queue = VecDeque::new();

        link_paths.insert(root.clone(), Path::from(root.clone()));
        queue.push_back(root.clone());

        while let Some(link) = queue.pop_front() {
            traversal.push(link.clone());
            let link_path = link_paths[&link].clone();
            for joint_name in child_joints.get(&link).into_iter().flatten() {
                let joint = joint_by_name[joint_name];
                let joint_path = link_path.join(joint_name.clone());
                joint_paths.insert(joint_name.clone(), joint_path.clone());
                link_paths.insert(
                    joint.child_link.clone(),
                    joint_path.join(joint.child_link.clone()),
                );
                queue.push_back(joint.child_link.clone());
            }
        }

        if traversal.len() != link_names.len() {
            let unreachable: Vec<_> = link_names
                .iter()
                .filter(|l| !link_paths.contains_key(*l))
                .map(Name::as_str)
                .collect();
            return Err(ModelError::InvalidTopology(format!(
                "links not reachable from root '{root}': {}",
                unreachable.join(", ")
            )));
        }

        Ok(Self {
            root,
            parent_joint,
            child_joints,
            traversal,
            link_paths,
            joint_paths,
        })
    }

    /// The unique root link.
    pub fn root(&self) -> &Name {
        &self.root
    }

    /// The joint whose child `link` is, if `link` is not the root.
    pub fn parent_joint(&self, link: &Name) -> Option<&Name> {
        self.parent_joint.get(link)
    }

    /// Joints whose parent is `link`, in declaration order.
    pub fn child_joints(&self, link: &Name) -> &[Name] {
        self.child_joints.get(link).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Links in breadth-first order starting at the root.
    pub fn traversal(&self) -> &[Name] {
        &self.traversal
    }

    /// Topology path of a link (`[root, joint, link, ...]`).
    pub fn link_path(&self, link: &Name) -> Option<&Path> {
        self.link_paths.get(link)
    }

    /// Topology path of a joint.
    pub fn joint_path(&self, joint: &Name) -> Option<&Path> {
        self.joint_paths.get(joint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Transform, Vec3};
    use crate::joint::{JointKind, JointLimits};

    fn joint(name: &str, parent: &str, child: &str) -> Joint {
        Joint {
            name: Name::new(name),
            kind: JointKind::Revolute,
            parent_link: Name::new(parent),
            child_link: Name::new(child),
            axis: Vec3::new(0.0, 0.0, 1.0),
            origin: Transform::identity(),
            limits: Some(JointLimits::symmetric(1.0, 1.0, 1.0)),
        }
    }

    fn names(names: &[&str]) -> Vec<Name> {
        names.iter().map(Name::new).collect()
    }

    #[test]
    fn test_pan_tilt_chain() {
        let links = names(&["base", "pan_link", "cam"]);
        let joints = vec![joint("pan", "base", "pan_link"), joint("tilt", "pan_link", "cam")];
        let topo = Topology::build(&links, &joints).unwrap();

        assert_eq!(topo.root().as_str(), "base");
        assert_eq!(topo.traversal(), &names(&["base", "pan_link", "cam"])[..]);
        assert_eq!(topo.parent_joint(&Name::new("cam")), Some(&Name::new("tilt")));
        assert_eq!(topo.child_joints(&Name::new("base")), &[Name::new("pan")]);
        assert_eq!(
            topo.link_path(&Name::new("cam")),
            Some(&Path::from(["base", "pan", "pan_link", "tilt", "cam"]))
        );
        assert_eq!(
            topo.joint_path(&Name::new("pan")),
            Some(&Path::from(["base", "pan"]))
        );
    }

    #[test]
    fn test_branching_preserves_declaration_order() {
        let links = names(&["base", "left", "right"]);
        let joints = vec![joint("l", "base", "left"), joint("r", "base", "right")];
        let topo = Topology::build(&links, &joints).unwrap();
        assert_eq!(topo.child_joints(&Name::new("base")), &[Name::new("l"), Name::new("r")]);
    }

    #[test]
    fn test_two_roots_rejected() {
        let links = names(&["a", "b", "c"]);
        let joints = vec![joint("j", "a", "b")];
        assert!(Topology::build(&links, &joints).is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        // a -> b -> a: b's child is a, so a has a parent and no root exists
        let links = names(&["a", "b"]);
        let joints = vec![joint("j1", "a", "b"), joint("j2", "b", "a")];
        assert!(Topology::build(&links, &joints).is_err());
    }

    #[test]
    fn test_double_parent_rejected() {
        let links = names(&["a", "b", "c"]);
        let joints = vec![joint("j1", "a", "c"), joint("j2", "b", "c")];
        assert!(Topology::build(&links, &joints).is_err());
    }

    #[test]
    fn test_unknown_link_rejected() {
        let links = names(&["a"]);
        let joints = vec![joint("j", "a", "ghost")];
        assert!(Topology::build(&links, &joints).is_err());
    }
}
