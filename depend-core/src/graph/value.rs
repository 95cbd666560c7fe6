//! Node Values
//!
//! A node stores either a scalar of a fixed primitive type or a dense array
//! of `f64` with a fixed shape. The shape is part of the node's declared
//! kind, so writes are validated against it rather than reshaped.

use std::fmt;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{DependError, Result};

use super::node::NodeLabel;

/// Array shape. Most physical arrays have rank four or less.
pub type Shape = SmallVec<[usize; 4]>;

/// A value held by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Array(ArrayD<f64>),
}

/// The declared kind of a node's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    Text,
    Array(Shape),
}

impl ValueKind {
    /// Array kind with the given shape.
    pub fn array(shape: &[usize]) -> Self {
        ValueKind::Array(shape.iter().copied().collect())
    }

    /// Check that `value` can be stored in a node of this kind.
    pub(crate) fn check(&self, node: &NodeLabel, value: &Value) -> Result<()> {
        let found = value.kind();
        match (self, &found) {
            (ValueKind::Array(expected), ValueKind::Array(shape)) if expected != shape => {
                Err(DependError::ShapeMismatch {
                    node: node.clone(),
                    expected: expected.to_vec(),
                    found: shape.to_vec(),
                })
            }
            (expected, found) if expected != found => Err(DependError::TypeMismatch {
                node: node.clone(),
                expected: expected.clone(),
                found: found.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Float => write!(f, "float"),
            ValueKind::Int => write!(f, "int"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Text => write!(f, "text"),
            ValueKind::Array(shape) => write!(f, "array{:?}", shape.as_slice()),
        }
    }
}

impl Value {
    /// The kind of this value, including the array shape.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::Array(a) => ValueKind::array(a.shape()),
        }
    }

    fn mismatch(&self, expected: ValueKind) -> DependError {
        DependError::TypeMismatch {
            node: NodeLabel::anonymous(),
            expected,
            found: self.kind(),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(x) => Ok(*x),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(x) => Ok(*x),
            other => Err(other.mismatch(ValueKind::Int)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(x) => Ok(*x),
            other => Err(other.mismatch(ValueKind::Bool)),
        }
    }

    pub fn as_text(&self) -> Result<&str> {
        match self {
            Value::Text(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::Text)),
        }
    }

    /// Borrow the array payload. The expected kind in the error carries the
    /// found shape, since any array would have been accepted.
    pub fn as_array(&self) -> Result<&ArrayD<f64>> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(other.mismatch(ValueKind::Array(Shape::new()))),
        }
    }

    pub(crate) fn as_array_mut(&mut self) -> Option<&mut ArrayD<f64>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(a: ArrayD<f64>) -> Self {
        Value::Array(a)
    }
}
