//! Port and parameter definitions.
//!
//! Ports are a node's data slots: inputs are bound to another node's output,
//! outputs hold the node's data objects. Parameters are typed settings whose
//! changes advance the node's modification time.

use crate::core::types::{PortType, Value};
use serde::{Deserialize, Serialize};

/// Direction of a port (input or output).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// Definition of a node port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    /// Unique name within the node
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Type of data this port accepts/produces
    pub port_type: PortType,
    pub direction: PortDirection,
    /// Whether an unconnected input is allowed
    pub optional: bool,
    pub description: String,
}

/// Definition of a node parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Unique name within the node
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    pub param_type: PortType,
    /// Value a freshly created node starts with
    pub default_value: Value,
    pub description: String,
    pub constraints: Vec<Constraint>,
}

/// Constraints checked whenever a parameter is set.
///
/// Numeric constraints applied to an array check every element.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "params")]
pub enum Constraint {
    /// Numeric value must be within range [min, max]
    Range { min: f64, max: f64 },
    /// String/array length must be >= min
    MinLength(usize),
    /// String/array length must be <= max
    MaxLength(usize),
    /// String must not be empty
    NotEmpty,
    /// Value must be one of the specified options
    OneOf(Vec<Value>),
    /// Number must be > 0
    Positive,
    /// Number must be >= 0
    NonNegative,
}

fn name_to_display(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// PortDefinition Builder Pattern
// ============================================================================

impl PortDefinition {
    /// Create a new input port definition.
    pub fn input(name: impl Into<String>, port_type: PortType) -> Self {
        let name = name.into();
        Self {
            display_name: name_to_display(&name),
            name,
            port_type,
            direction: PortDirection::Input,
            optional: false,
            description: String::new(),
        }
    }

    /// Create a new output port definition.
    pub fn output(name: impl Into<String>, port_type: PortType) -> Self {
        let name = name.into();
        Self {
            display_name: name_to_display(&name),
            name,
            port_type,
            direction: PortDirection::Output,
            optional: false,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark this port as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

// ============================================================================
// ParameterDefinition Builder Pattern
// ============================================================================

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, param_type: PortType, default_value: Value) -> Self {
        let name = name.into();
        Self {
            display_name: name_to_display(&name),
            name,
            param_type,
            default_value,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a range constraint.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraints.push(Constraint::Range { min, max });
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Validate a value against this parameter's type and constraints.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.param_type.matches(value) {
            return Err(format!(
                "Type mismatch for parameter '{}': expected {}, got {}",
                self.name,
                self.param_type,
                value.get_type()
            ));
        }
        for constraint in &self.constraints {
            constraint.validate(value)?;
        }
        Ok(())
    }
}

// ============================================================================
// Constraint Validation
// ============================================================================

impl Constraint {
    /// Validate a value against this constraint.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if let (Value::Array(items), true) = (value, self.is_numeric()) {
            return items.iter().try_for_each(|item| self.validate(item));
        }

        match self {
            Constraint::Range { min, max } => {
                if let Some(num) = value.as_float() {
                    if num < *min || num > *max {
                        return Err(format!("Value {} is out of range [{}, {}]", num, min, max));
                    }
                }
            }
            Constraint::MinLength(min_len) => {
                let len = Self::length(value);
                if len < *min_len {
                    return Err(format!("Length {} is below minimum {}", len, min_len));
                }
            }
            Constraint::MaxLength(max_len) => {
                let len = Self::length(value);
                if len > *max_len {
                    return Err(format!("Length {} is above maximum {}", len, max_len));
                }
            }
            Constraint::NotEmpty => {
                if Self::length(value) == 0 {
                    return Err("Value must not be empty".to_string());
                }
            }
            Constraint::OneOf(options) => {
                if !options.contains(value) {
                    let options: Vec<String> = options.iter().map(|o| o.to_string()).collect();
                    return Err(format!(
                        "Value {} must be one of: {}",
                        value,
                        options.join(", ")
                    ));
                }
            }
            Constraint::Positive => {
                if let Some(num) = value.as_float() {
                    if num <= 0.0 {
                        return Err(format!("Value {} must be positive", num));
                    }
                }
            }
            Constraint::NonNegative => {
                if let Some(num) = value.as_float() {
                    if num < 0.0 {
                        return Err(format!("Value {} must be non-negative", num));
                    }
                }
            }
        }
        Ok(())
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            Constraint::Range { .. }
                | Constraint::Positive
                | Constraint::NonNegative
        )
    }

    fn length(value: &Value) -> usize {
        match value {
            Value::String(s) => s.len(),
            Value::Array(arr) => arr.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_display_name() {
        let port = PortDefinition::input("input_image", PortType::Image);
        assert_eq!(port.display_name, "Input Image");
        assert_eq!(port.direction, PortDirection::Input);
    }

    #[test]
    fn test_parameter_validation() {
        let param = ParameterDefinition::new("variance", PortType::Float, Value::Float(1.0))
            .with_constraint(Constraint::NonNegative);
        assert!(param.validate(&Value::Float(2.0)).is_ok());
        assert!(param.validate(&Value::Integer(2)).is_ok());
        assert!(param.validate(&Value::Float(-1.0)).is_err());
        assert!(param.validate(&Value::from("x")).is_err());
    }

    #[test]
    fn test_array_elements_checked() {
        let param = ParameterDefinition::new(
            "size",
            PortType::Array(Box::new(PortType::Integer)),
            Value::from(vec![64i64, 64]),
        )
        .with_constraint(Constraint::Positive)
        .with_constraint(Constraint::MinLength(1));
        assert!(param.validate(&Value::from(vec![3i64, 4, 5])).is_ok());
        assert!(param.validate(&Value::from(vec![3i64, 0])).is_err());
        assert!(param.validate(&Value::Array(Vec::new())).is_err());
    }

    #[test]
    fn test_one_of() {
        let constraint = Constraint::OneOf(vec![Value::from("nearest"), Value::from("mirror")]);
        assert!(constraint.validate(&Value::from("mirror")).is_ok());
        assert!(constraint.validate(&Value::from("wrap")).is_err());
    }
}
