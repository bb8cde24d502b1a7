//! Schema fragments and typed values for parameters and command goals.
//!
//! A [`Schema`] maps entry names to [`SchemaEntry`] fragments (type tag,
//! optional range, unit, default, doc). A stored or supplied [`Value`] is
//! only accepted when it validates against its fragment, so every value the
//! runtime holds is schema-valid by construction.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::error::ModelError;
use crate::name::Name;

/// Typed scalar or list value.
///
/// The runtime stores parameters, command goals, and device options as
/// `Value`s. Integers and floats are distinct: an `Int` validates against a
/// `Float` fragment (widening), never the reverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float (SI units where physical).
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Homogeneous or mixed list.
    List(Vec<Value>),
}

impl Value {
    /// The type tag this value carries.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::List(_) => ValueType::List,
        }
    }

    /// Numeric view used for range checks. `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Type tag for schema fragments and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Float; accepts integer values by widening.
    Float,
    /// String.
    Str,
    /// List of values.
    List,
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::List => "list",
        };
        f.write_str(s)
    }
}

/// One schema fragment: the contract a single value must satisfy.
///
/// # Examples
///
/// ```rust
/// use botsys_model::{SchemaEntry, Value, ValueType};
///
/// let kp = SchemaEntry::new(ValueType::Float)
///     .with_min(0.0)
///     .with_unit("1/s")
///     .with_default(Value::Float(1.0))
///     .with_doc("Proportional gain");
///
/// assert!(kp.validate(&Value::Float(2.5)).is_ok());
/// assert!(kp.validate(&Value::Float(-1.0)).is_err());
/// assert!(kp.validate(&Value::Str("fast".into())).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Required value type.
    pub value_type: ValueType,
    /// Inclusive lower bound for numeric values.
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric values.
    pub max: Option<f64>,
    /// SI unit annotation (informational, checked for presence on set).
    pub unit: Option<String>,
    /// Default applied at registration or goal validation.
    pub default: Option<Value>,
    /// Human-readable description.
    pub doc: Option<String>,
}

impl SchemaEntry {
    /// Create a fragment requiring `value_type` with no further constraints.
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            min: None,
            max: None,
            unit: None,
            default: None,
            doc: None,
        }
    }

    /// Builder: inclusive lower bound.
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Builder: inclusive upper bound.
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Builder: SI unit annotation.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Builder: default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Builder: documentation string.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Check that the fragment itself is coherent (bounds ordered, default
    /// valid against the fragment).
    pub fn check(&self) -> Result<(), ModelError> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ModelError::InvalidSchema(format!(
                    "min {min} exceeds max {max}"
                )));
            }
        }
        if matches!(self.value_type, ValueType::Bool | ValueType::Str)
            && (self.min.is_some() || self.max.is_some())
        {
            return Err(ModelError::InvalidSchema(format!(
                "range bounds are not applicable to {}",
                self.value_type
            )));
        }
        if let Some(default) = &self.default {
            self.validate(default).map_err(|reason| {
                ModelError::InvalidSchema(format!("default rejected: {reason}"))
            })?;
        }
        Ok(())
    }

    /// Validate a value against this fragment.
    ///
    /// Returns a human-readable rejection reason on failure; the caller
    /// wraps it into its own error type.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let actual = value.value_type();
        let type_ok = actual == self.value_type
            || (self.value_type == ValueType::Float && actual == ValueType::Int);
        if !type_ok {
            return Err(format!("expected {}, got {}", self.value_type, actual));
        }
        if let Some(v) = value.as_f64() {
            if let Some(min) = self.min {
                if v < min {
                    return Err(format!("must be >= {min}"));
                }
            }
            if let Some(max) = self.max {
                if v > max {
                    return Err(format!("must be <= {max}"));
                }
            }
        }
        Ok(())
    }
}

/// Named collection of schema fragments, used for parameter components,
/// command goals, and device options.
///
/// Entries are kept ordered by name so listings and error reports are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    entries: BTreeMap<Name, SchemaEntry>,
}

impl Schema {
    /// Empty schema (accepts only the empty value map).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an entry.
    pub fn with(mut self, name: impl Into<Name>, entry: SchemaEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    /// Fragment for `name`, if declared.
    pub fn get(&self, name: &Name) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    /// Iterate `(name, fragment)` pairs in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&Name, &SchemaEntry)> {
        self.entries.iter()
    }

    /// Number of declared entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schema declares no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every fragment for internal coherence.
    pub fn check(&self) -> Result<(), ModelError> {
        for (name, entry) in &self.entries {
            entry
                .check()
                .map_err(|e| ModelError::InvalidSchema(format!("entry '{name}': {e}")))?;
        }
        Ok(())
    }

    /// Validate a value map against the schema and apply defaults.
    ///
    /// Unknown keys are rejected; missing keys take their declared default;
    /// missing keys without a default are rejected. On success the returned
    /// map contains an entry for every schema key that has either a supplied
    /// value or a default.
    pub fn apply(&self, values: &BTreeMap<Name, Value>) -> Result<BTreeMap<Name, Value>, Vec<(Name, String)>> {
        let mut failures = Vec::new();
        let mut out = BTreeMap::new();

        for key in values.keys() {
            if !self.entries.contains_key(key) {
                failures.push((key.clone(), "unknown argument".to_string()));
            }
        }

        for (name, entry) in &self.entries {
            match values.get(name) {
                Some(value) => match entry.validate(value) {
                    Ok(()) => {
                        out.insert(name.clone(), value.clone());
                    }
                    Err(reason) => failures.push((name.clone(), reason)),
                },
                None => {
                    if let Some(default) = &entry.default {
                        out.insert(name.clone(), default.clone());
                    } else {
                        failures.push((name.clone(), "required argument missing".to_string()));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(out)
        } else {
            Err(failures)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid_schema() -> Schema {
        Schema::new()
            .with(
                "kp",
                SchemaEntry::new(ValueType::Float)
                    .with_min(0.0)
                    .with_default(Value::Float(1.0)),
            )
            .with("ki", SchemaEntry::new(ValueType::Float).with_min(0.0))
    }

    #[test]
    fn test_int_widens_to_float() {
        let entry = SchemaEntry::new(ValueType::Float);
        assert!(entry.validate(&Value::Int(3)).is_ok());
        // But a float never narrows to int
        let entry = SchemaEntry::new(ValueType::Int);
        assert!(entry.validate(&Value::Float(3.0)).is_err());
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let entry = SchemaEntry::new(ValueType::Float).with_min(-1.0).with_max(1.0);
        assert!(entry.validate(&Value::Float(-1.0)).is_ok());
        assert!(entry.validate(&Value::Float(1.0)).is_ok());
        assert!(entry.validate(&Value::Float(1.0001)).is_err());
    }

    #[test]
    fn test_incoherent_fragment_rejected() {
        let entry = SchemaEntry::new(ValueType::Float).with_min(2.0).with_max(1.0);
        assert!(entry.check().is_err());

        let entry = SchemaEntry::new(ValueType::Str).with_min(0.0);
        assert!(entry.check().is_err());

        let entry = SchemaEntry::new(ValueType::Float)
            .with_min(0.0)
            .with_default(Value::Float(-5.0));
        assert!(entry.check().is_err());
    }

    #[test]
    fn test_apply_fills_defaults() {
        let schema = pid_schema();
        let mut values = BTreeMap::new();
        values.insert(Name::new("ki"), Value::Float(0.5));

        let out = schema.apply(&values).unwrap();
        assert_eq!(out.get("kp"), Some(&Value::Float(1.0)));
        assert_eq!(out.get("ki"), Some(&Value::Float(0.5)));
    }

    #[test]
    fn test_apply_collects_all_failures() {
        let schema = pid_schema();
        let mut values = BTreeMap::new();
        values.insert(Name::new("ki"), Value::Float(-1.0));
        values.insert(Name::new("kd"), Value::Float(0.1));

        let failures = schema.apply(&values).unwrap_err();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|(n, _)| n.as_str() == "ki"));
        assert!(failures.iter().any(|(n, _)| n.as_str() == "kd"));
    }

    #[test]
    fn test_apply_missing_required() {
        let schema = Schema::new().with("joint", SchemaEntry::new(ValueType::Str));
        let failures = schema.apply(&BTreeMap::new()).unwrap_err();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].1.contains("required"));
    }

    #[test]
    fn test_value_serde_untagged() {
        let v: Value = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, Value::Float(2.5));
        let v: Value = serde_json::from_str("true").unwrap();
        assert_eq!(v, Value::Bool(true));
        let v: Value = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Int(2)]));
    }
}
