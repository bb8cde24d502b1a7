//! Ordered name sequences addressing topology locations, parameter keys,
//! and pub/sub topics.
//!
//! A [`Path`] is an ordered sequence of [`Name`] tokens. The empty path
//! matches everything as a prefix; tokens compare by equality. Paths
//! display as `/a/b/c`.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::name::Name;

/// Ordered sequence of names identifying a location in the topology or
/// parameter tree, and serving as a pub/sub address.
///
/// # Prefix semantics
///
/// `p.starts_with(&q)` is true when `q`'s tokens are a leading run of
/// `p`'s tokens. The empty path is a prefix of every path.
///
/// # Examples
///
/// ```rust
/// use botsys_model::Path;
///
/// let topic = Path::from(["sensor", "base", "imu"]);
/// assert!(topic.starts_with(&Path::from(["sensor"])));
/// assert!(topic.starts_with(&Path::root()));
/// assert!(!topic.starts_with(&Path::from(["actuator"])));
/// assert_eq!(topic.to_string(), "/sensor/base/imu");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Name>);

impl Path {
    /// The empty path, matching every published path as a prefix.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from a token sequence.
    pub fn new(tokens: Vec<Name>) -> Self {
        Self(tokens)
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root (empty) path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &Name> {
        self.0.iter()
    }

    /// The first token, if any.
    pub fn head(&self) -> Option<&Name> {
        self.0.first()
    }

    /// The last token, if any.
    pub fn leaf(&self) -> Option<&Name> {
        self.0.last()
    }

    /// True when `prefix`'s tokens are a leading run of this path's tokens.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.0.len() <= self.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Return a new path with `token` appended.
    pub fn join(&self, token: impl Into<Name>) -> Self {
        let mut tokens = self.0.clone();
        tokens.push(token.into());
        Self(tokens)
    }

    /// Return a new path with all of `suffix`'s tokens appended.
    pub fn concat(&self, suffix: &Path) -> Self {
        let mut tokens = self.0.clone();
        tokens.extend(suffix.0.iter().cloned());
        Self(tokens)
    }

    /// The path without its last token. Root's parent is root.
    pub fn parent(&self) -> Self {
        let mut tokens = self.0.clone();
        tokens.pop();
        Self(tokens)
    }

    /// Dotted key form used by the durable parameter store (`a.b.c`).
    pub fn storage_key(&self) -> String {
        self.0
            .iter()
            .map(Name::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Parse a dotted storage key back into a path.
    pub fn from_storage_key(key: &str) -> Self {
        if key.is_empty() {
            return Self::root();
        }
        Self(key.split('.').map(Name::new).collect())
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for token in &self.0 {
            write!(f, "/{token}")?;
        }
        Ok(())
    }
}

impl<T: Into<Name>, const N: usize> From<[T; N]> for Path {
    fn from(tokens: [T; N]) -> Self {
        Self(tokens.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<Name>> for Path {
    fn from(tokens: Vec<Name>) -> Self {
        Self(tokens)
    }
}

impl From<Name> for Path {
    fn from(token: Name) -> Self {
        Self(vec![token])
    }
}

impl FromIterator<Name> for Path {
    fn from_iter<I: IntoIterator<Item = Name>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_root_is_prefix_of_everything() {
        let root = Path::root();
        assert!(Path::from(["sensor", "base", "imu"]).starts_with(&root));
        assert!(root.starts_with(&root));
    }

    #[test]
    fn test_prefix_match_by_token_not_by_string() {
        // "/sen" is not a prefix of "/sensor": tokens compare by equality
        let published = Path::from(["sensor", "base"]);
        assert!(!published.starts_with(&Path::from(["sen"])));
        assert!(published.starts_with(&Path::from(["sensor"])));
    }

    #[test]
    fn test_longer_prefix_never_matches() {
        let published = Path::from(["param"]);
        assert!(!published.starts_with(&Path::from(["param", "pid"])));
    }

    #[test]
    fn test_join_and_parent() {
        let p = Path::from(["pid"]).join("kp");
        assert_eq!(p, Path::from(["pid", "kp"]));
        assert_eq!(p.parent(), Path::from(["pid"]));
        assert_eq!(Path::root().parent(), Path::root());
    }

    #[test]
    fn test_display() {
        assert_eq!(Path::root().to_string(), "/");
        assert_eq!(Path::from(["actuator", "pan"]).to_string(), "/actuator/pan");
    }

    #[test]
    fn test_storage_key_round_trip() {
        let p = Path::from(["pid", "kp"]);
        assert_eq!(p.storage_key(), "pid.kp");
        assert_eq!(Path::from_storage_key("pid.kp"), p);
        assert_eq!(Path::from_storage_key(""), Path::root());
    }

    proptest! {
        #[test]
        fn prop_concat_preserves_prefix(
            a in proptest::collection::vec("[a-z]{1,8}", 0..4),
            b in proptest::collection::vec("[a-z]{1,8}", 0..4),
        ) {
            let prefix = Path::new(a.iter().map(Name::new).collect());
            let suffix = Path::new(b.iter().map(Name::new).collect());
            let full = prefix.concat(&suffix);
            prop_assert!(full.starts_with(&prefix));
            prop_assert_eq!(full.len(), prefix.len() + suffix.len());
        }
    }
}
