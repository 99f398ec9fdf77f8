//! Row and value model
//!
//! A deliberately small value model: just enough for the coordinator to
//! compare sort keys during an ordered merge and to re-combine scalar
//! aggregates across slices. Entity field state never flows through here;
//! that belongs to each slice's local store.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, SliceError};

/// A single scalar value in a query result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
}

/// One result row: a flat list of column values.
pub type Row = Vec<Value>;

impl Value {
    /// Whether this value is numeric (int or float).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric view as f64, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view, if integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// Compare two values for ordering purposes.
///
/// Numeric values compare across Int/Float; strings compare
/// lexicographically; timestamps compare chronologically. `Null` orders
/// before every non-null value. Returns `None` for incomparable type pairs.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        _ if a.is_numeric() && b.is_numeric() => {
            a.as_f64().unwrap().partial_cmp(&b.as_f64().unwrap())
        }
        _ => None,
    }
}

/// Numeric addition for SUM/COUNT re-combination.
///
/// Int + Int stays Int; any float operand widens to Float. Null is the
/// additive identity (an empty partial contributes nothing).
pub fn add_values(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x + y)),
        _ if a.is_numeric() && b.is_numeric() => {
            Ok(Value::Float(a.as_f64().unwrap() + b.as_f64().unwrap()))
        }
        _ => Err(SliceError::Unsupported(format!(
            "cannot add non-numeric values {:?} and {:?}",
            a, b
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
