//! Value model (C1)
//!
//! Typed values flowing through the expression engine and the scope tree:
//! string, boolean, list, a late-typed "dynamic" string, and an absent
//! value of otherwise-known kind (used by stub insertion, §4.9).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind tag of a `Value`, independent of whether a value is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    Text,
    List,
    /// A value whose kind is not yet known; resolved by context at use.
    Dynamic,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Text => "text",
            ValueKind::List => "list",
            ValueKind::Dynamic => "dynamic",
        };
        write!(f, "{}", s)
    }
}

/// A tagged, immutable value. `Empty` carries no kind and never equals any
/// present value, including `TypedEmpty` of the same kind (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Empty,
    Boolean(bool),
    Text(String),
    List(Vec<String>),
    /// A string literal whose target kind has not yet been resolved.
    Dynamic(String),
    /// A typed absence, used by inserted stubs so references stay
    /// well-typed without claiming presence.
    TypedEmpty(ValueKind),
}

/// Error coercing a `Value` to a target kind.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CoerceError {
    #[error("cannot coerce {from} value to {to}")]
    Mismatch { from: String, to: ValueKindLabel },
    #[error("value is empty")]
    Empty,
    #[error("'{0}' is not a valid {1}")]
    Unparseable(String, ValueKindLabel),
}

/// A `Display`-able wrapper so `CoerceError` doesn't need `ValueKind` to be
/// the error-carrying type itself.
pub type ValueKindLabel = ValueKind;

impl Value {
    pub fn of_string(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn of_bool(b: bool) -> Self {
        Value::Boolean(b)
    }

    pub fn of_list(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn dynamic(s: impl Into<String>) -> Self {
        Value::Dynamic(s.into())
    }

    pub fn typed(kind: ValueKind) -> Self {
        Value::TypedEmpty(kind)
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Value::Empty | Value::TypedEmpty(_))
    }

    /// The kind this value would coerce to, if determinable without
    /// context. `Empty` has no kind.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Empty => None,
            Value::Boolean(_) => Some(ValueKind::Boolean),
            Value::Text(_) => Some(ValueKind::Text),
            Value::List(_) => Some(ValueKind::List),
            Value::Dynamic(_) => Some(ValueKind::Dynamic),
            Value::TypedEmpty(k) => Some(*k),
        }
    }

    /// Coerce to a boolean: case-insensitive "true"/"false" for text/dynamic.
    pub fn as_bool(&self) -> Result<bool, CoerceError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Text(s) | Value::Dynamic(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(CoerceError::Unparseable(s.clone(), ValueKind::Boolean)),
            },
            Value::Empty | Value::TypedEmpty(_) => Err(CoerceError::Empty),
            Value::List(_) => Err(CoerceError::Mismatch {
                from: "list".into(),
                to: ValueKind::Boolean,
            }),
        }
    }

    /// Coerce to a list: comma-split for text/dynamic.
    pub fn as_list(&self) -> Result<Vec<String>, CoerceError> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Text(s) | Value::Dynamic(s) => {
                Ok(s.split(',').map(|part| part.trim().to_string()).collect())
            }
            Value::Empty | Value::TypedEmpty(_) => Err(CoerceError::Empty),
            Value::Boolean(_) => Err(CoerceError::Mismatch {
                from: "boolean".into(),
                to: ValueKind::List,
            }),
        }
    }

    /// Coerce to its string representation.
    pub fn as_string(&self) -> Result<String, CoerceError> {
        match self {
            Value::Text(s) | Value::Dynamic(s) => Ok(s.clone()),
            Value::Boolean(b) => Ok(b.to_string()),
            Value::List(items) => Ok(items.join(",")),
            Value::Empty | Value::TypedEmpty(_) => Err(CoerceError::Empty),
        }
    }

    /// Coerce to an integer (decimal parse of the string form).
    pub fn as_int(&self) -> Result<i64, CoerceError> {
        let s = self.as_string()?;
        s.trim()
            .parse::<i64>()
            .map_err(|_| CoerceError::Unparseable(s, ValueKind::Text))
    }

    /// `sizeof`: list length, string length, or 1/0 for booleans present/absent.
    pub fn size(&self) -> Result<usize, CoerceError> {
        match self {
            Value::List(items) => Ok(items.len()),
            Value::Text(s) | Value::Dynamic(s) => Ok(s.len()),
            Value::Boolean(b) => Ok(if *b { 1 } else { 0 }),
            Value::Empty | Value::TypedEmpty(_) => Err(CoerceError::Empty),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dynamic(a), Value::Dynamic(b)) => a == b,
            (Value::TypedEmpty(a), Value::TypedEmpty(b)) => a == b,
            // Cross-representation equality: a dynamic literal that parses to
            // the same present value as a typed one compares equal, but
            // Empty never equals anything (including TypedEmpty), per spec.
            (Value::Dynamic(s), Value::Boolean(b)) | (Value::Boolean(b), Value::Dynamic(s)) => {
                matches!(s.to_ascii_lowercase().as_str(), "true" | "false")
                    && (s.eq_ignore_ascii_case("true")) == *b
            }
            (Value::Dynamic(s), Value::Text(t)) | (Value::Text(t), Value::Dynamic(s)) => s == t,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, ""),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) | Value::Dynamic(s) => write!(f, "{}", s),
            Value::List(items) => write!(f, "{}", items.join(",")),
            Value::TypedEmpty(_) => write!(f, ""),
        }
    }
}
