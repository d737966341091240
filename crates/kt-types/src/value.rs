//! Parameter values and configurations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single value from a parameter domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Numeric view of the value, `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Str(_))
    }

    // -0.0 and 0.0 must hash and compare identically.
    fn float_bits(v: f64) -> u64 {
        if v == 0.0 {
            0
        } else {
            v.to_bits()
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => Self::float_bits(*a) == Self::float_bits(*b),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Self::Float(v) => {
                1u8.hash(state);
                Self::float_bits(*v).hash(state);
            }
            Self::Str(v) => {
                2u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// One assignment of every tunable parameter, positional in declaration order.
///
/// Equality and hashing cover the full assignment, so a `Configuration` is
/// directly usable as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(Vec<ParamValue>);

impl Configuration {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&ParamValue> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this configuration with one coordinate replaced.
    pub fn with_value(&self, index: usize, value: ParamValue) -> Self {
        let mut values = self.0.clone();
        values[index] = value;
        Self(values)
    }

    /// Pair the values with their parameter names.
    pub fn named(&self, names: &[String]) -> BTreeMap<String, ParamValue> {
        names
            .iter()
            .cloned()
            .zip(self.0.iter().cloned())
            .collect()
    }

    /// Number of coordinates in which two configurations differ.
    pub fn hamming_distance(&self, other: &Configuration) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a != b)
            .count()
            + self.0.len().abs_diff(other.0.len())
    }
}

impl From<Vec<ParamValue>> for Configuration {
    fn from(values: Vec<ParamValue>) -> Self {
        Self(values)
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}
