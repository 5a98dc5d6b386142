//! Parameter value types.
//!
//! Image data does not travel as a `Value`: it lives in the graph's data
//! objects. `Value` carries the typed node parameters whose changes drive
//! the modification clock.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node parameter value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Homogeneous array of values (sizes, radii, origins)
    Array(Vec<Value>),
}

/// Types accepted by ports and parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "inner")]
pub enum PortType {
    Image,
    Integer,
    Float,
    String,
    Boolean,
    /// Array of a specific type
    Array(Box<PortType>),
    /// Accepts any type
    Any,
}

// ============================================================================
// Value Implementation
// ============================================================================

impl Value {
    /// Get the port type of this value.
    pub fn get_type(&self) -> PortType {
        match self {
            Value::Integer(_) => PortType::Integer,
            Value::Float(_) => PortType::Float,
            Value::String(_) => PortType::String,
            Value::Boolean(_) => PortType::Boolean,
            Value::Array(arr) => match arr.first() {
                Some(first) => PortType::Array(Box::new(first.get_type())),
                None => PortType::Array(Box::new(PortType::Any)),
            },
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Integers are converted to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// An integer array, or a single integer as a one-element list.
    pub fn as_integer_list(&self) -> Option<Vec<i64>> {
        match self {
            Value::Integer(i) => Some(vec![*i]),
            Value::Array(arr) => arr.iter().map(Value::as_integer).collect(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{:.4}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Array(v.into_iter().map(Value::Integer).collect())
    }
}

// ============================================================================
// PortType Implementation
// ============================================================================

impl PortType {
    /// Check if a value matches this type.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (PortType::Any, _) => true,
            (PortType::Integer, Value::Integer(_)) => true,
            (PortType::Float, Value::Float(_)) => true,
            // Integer can be used where float is expected
            (PortType::Float, Value::Integer(_)) => true,
            (PortType::String, Value::String(_)) => true,
            (PortType::Boolean, Value::Boolean(_)) => true,
            (PortType::Array(inner), Value::Array(arr)) => arr.iter().all(|v| inner.matches(v)),
            _ => false,
        }
    }

    /// Check if an output of this type may feed an input of `other`.
    pub fn compatible_with(&self, other: &PortType) -> bool {
        match (self, other) {
            (PortType::Any, _) | (_, PortType::Any) => true,
            (PortType::Integer, PortType::Float) => true,
            (PortType::Array(a), PortType::Array(b)) => a.compatible_with(b),
            (a, b) => a == b,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            PortType::Image => "Image".to_string(),
            PortType::Integer => "Integer".to_string(),
            PortType::Float => "Float".to_string(),
            PortType::String => "String".to_string(),
            PortType::Boolean => "Boolean".to_string(),
            PortType::Array(inner) => format!("Array<{}>", inner.display_name()),
            PortType::Any => "Any".to_string(),
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_detection() {
        assert_eq!(Value::Integer(42).get_type(), PortType::Integer);
        assert_eq!(Value::Float(3.14).get_type(), PortType::Float);
        assert_eq!(
            Value::from(vec![1i64, 2]).get_type(),
            PortType::Array(Box::new(PortType::Integer))
        );
    }

    #[test]
    fn test_integer_list() {
        assert_eq!(Value::from(vec![3i64, 4]).as_integer_list(), Some(vec![3, 4]));
        assert_eq!(Value::Integer(2).as_integer_list(), Some(vec![2]));
        assert_eq!(Value::from("2").as_integer_list(), None);
    }

    #[test]
    fn test_port_type_matching() {
        assert!(PortType::Float.matches(&Value::Integer(42)));
        assert!(!PortType::Integer.matches(&Value::Float(1.5)));
        assert!(PortType::Array(Box::new(PortType::Integer)).matches(&Value::from(vec![1i64, 2])));
        assert!(PortType::Any.matches(&Value::Boolean(true)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(vec![1i64, 2]).to_string(), "[1, 2]");
        assert_eq!(PortType::Array(Box::new(PortType::Float)).to_string(), "Array<Float>");
    }
}
