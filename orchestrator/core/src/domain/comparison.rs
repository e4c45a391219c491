// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Snapshot Comparison Primitives
//!
//! Structural helpers used by the reconciler to compare the same field across
//! two source snapshots:
//!
//! - [`resolve_path`] walks a dot-separated path (`"order.items.0.sku"`) into a
//!   snapshot. Numeric segments index arrays. Traversal stops at the first
//!   missing segment or non-container value and reports the field as absent.
//! - [`deep_equal`] is order-independent structural equality: objects must have
//!   the identical key set with recursively equal values, arrays are compared
//!   element-wise, and numbers compare numerically (`1 == 1.0`).
//! - [`classify_drift`] turns a pair of extracted values into a [`DriftKind`].

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::reconciliation::DriftKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldPathError {
    #[error("Field path is empty")]
    Empty,
    #[error("Field path '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// Coarse JSON type used to distinguish a type mismatch from a value mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }
}

/// Split and validate a dot-path. Rejects `""`, `"a..b"`, `".a"` and `"a."`.
pub fn parse_path(path: &str) -> Result<Vec<&str>, FieldPathError> {
    if path.is_empty() {
        return Err(FieldPathError::Empty);
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(FieldPathError::EmptySegment(path.to_string()));
    }
    Ok(segments)
}

/// Look up `path` in `snapshot`. `Ok(None)` means the field is absent.
pub fn resolve_path<'a>(
    snapshot: &'a Map<String, Value>,
    path: &str,
) -> Result<Option<&'a Value>, FieldPathError> {
    let segments = parse_path(path)?;
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Err(FieldPathError::Empty),
    };

    let mut current = match snapshot.get(*first) {
        Some(value) => value,
        None => return Ok(None),
    };

    for segment in rest {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(fx), Some(fy)) => fx == fy,
                _ => false,
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, l)| match y.get(key) {
                    Some(r) => deep_equal(l, r),
                    None => false,
                })
        }
        _ => false,
    }
}

/// Classify the drift between the values two sources hold for one field.
pub fn classify_drift(a: Option<&Value>, b: Option<&Value>) -> DriftKind {
    match (a, b) {
        (None, None) => DriftKind::None,
        (None, Some(_)) => DriftKind::MissingA,
        (Some(_), None) => DriftKind::MissingB,
        (Some(a), Some(b)) => {
            if ValueKind::of(a) != ValueKind::of(b) {
                DriftKind::TypeMismatch
            } else if !deep_equal(a, b) {
                DriftKind::ValueMismatch
            } else {
                DriftKind::None
            }
        }
    }
}
