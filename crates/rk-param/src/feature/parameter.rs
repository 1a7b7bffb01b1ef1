//! Typed feature parameters

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameter-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Unknown parameter '{0}'")]
    Unknown(String),

    #[error("Parameter '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Value {value} for '{name}' is out of range")]
    OutOfRange { name: String, value: String },

    #[error("Value {value} for '{name}' must be {constraint}")]
    Constraint {
        name: String,
        value: String,
        constraint: Constraint,
    },
}

/// A parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f32),
    Integer(i64),
    Boolean(bool),
    Vector(Vec3),
}

impl ParameterValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Float(_) => "float",
            ParameterValue::Integer(_) => "integer",
            ParameterValue::Boolean(_) => "boolean",
            ParameterValue::Vector(_) => "vector",
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{v}"),
            ParameterValue::Integer(v) => write!(f, "{v}"),
            ParameterValue::Boolean(v) => write!(f, "{v}"),
            ParameterValue::Vector(v) => write!(f, "{v}"),
        }
    }
}

/// Range constraint on numeric parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Constraint {
    #[default]
    Any,
    Positive,
    NonNegative,
}

impl Constraint {
    fn admits(&self, value: &ParameterValue) -> bool {
        let number = match value {
            ParameterValue::Float(v) => f64::from(*v),
            ParameterValue::Integer(v) => *v as f64,
            _ => return true,
        };
        match self {
            Constraint::Any => true,
            Constraint::Positive => number > 0.0,
            Constraint::NonNegative => number >= 0.0,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Constraint::Any => "any value",
            Constraint::Positive => "positive",
            Constraint::NonNegative => "non-negative",
        })
    }
}

/// A named, typed parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    value: ParameterValue,
    #[serde(default)]
    constraint: Constraint,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
            constraint: Constraint::Any,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn value(&self) -> ParameterValue {
        self.value
    }

    pub fn constraint(&self) -> Constraint {
        self.constraint
    }

    /// Set a new value of the same type. Returns whether the value changed.
    pub fn set(&mut self, value: ParameterValue) -> Result<bool, ParameterError> {
        if std::mem::discriminant(&value) != std::mem::discriminant(&self.value) {
            return Err(ParameterError::TypeMismatch {
                name: self.name.clone(),
                expected: self.value.type_name(),
                found: value.type_name(),
            });
        }
        if !self.constraint.admits(&value) {
            return Err(ParameterError::Constraint {
                name: self.name.clone(),
                value: value.to_string(),
                constraint: self.constraint,
            });
        }
        let changed = self.value != value;
        self.value = value;
        Ok(changed)
    }
}

/// Ordered parameter list of one feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    items: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, parameter: Parameter) -> Self {
        self.items.push(parameter);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| p.name == name)
    }

    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<bool, ParameterError> {
        self.items
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?
            .set(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn value(&self, name: &str) -> Result<ParameterValue, ParameterError> {
        self.get(name)
            .map(Parameter::value)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))
    }

    fn mismatch(name: &str, expected: &'static str, found: ParameterValue) -> ParameterError {
        ParameterError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn float(&self, name: &str) -> Result<f32, ParameterError> {
        match self.value(name)? {
            ParameterValue::Float(v) => Ok(v),
            other => Err(Self::mismatch(name, "float", other)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, ParameterError> {
        match self.value(name)? {
            ParameterValue::Integer(v) => Ok(v),
            other => Err(Self::mismatch(name, "integer", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, ParameterError> {
        match self.value(name)? {
            ParameterValue::Boolean(v) => Ok(v),
            other => Err(Self::mismatch(name, "boolean", other)),
        }
    }

    pub fn vector(&self, name: &str) -> Result<Vec3, ParameterError> {
        match self.value(name)? {
            ParameterValue::Vector(v) => Ok(v),
            other => Err(Self::mismatch(name, "vector", other)),
        }
    }
}
