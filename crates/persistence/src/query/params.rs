//! Bound statement parameters.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{RequestError, StorageResult};

/// A SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text parameter.
    Text(String),
    /// Floating point parameter.
    Float(f64),
    /// Integer parameter.
    Integer(i64),
    /// Boolean parameter.
    Bool(bool),
    /// Timestamp parameter.
    Timestamp(DateTime<Utc>),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a text parameter.
    pub fn text(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }

    /// Whether this value counts as empty for filtering.
    ///
    /// Only null and the empty string are empty. `false`, `0` and `"0"` are
    /// meaningful filter values.
    pub fn is_empty(&self) -> bool {
        match self {
            SqlParam::Null => true,
            SqlParam::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Converts a scalar JSON value. Arrays and objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(SqlParam::Null),
            Value::Bool(b) => Some(SqlParam::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(SqlParam::Integer)
                .or_else(|| n.as_f64().map(SqlParam::Float)),
            Value::String(s) => Some(SqlParam::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Converts this parameter into its JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            SqlParam::Text(s) => Value::String(s.clone()),
            SqlParam::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlParam::Integer(i) => Value::from(*i),
            SqlParam::Bool(b) => Value::Bool(*b),
            SqlParam::Timestamp(t) => Value::String(t.to_rfc3339()),
            SqlParam::Null => Value::Null,
        }
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Text(s) => write!(f, "{}", s),
            SqlParam::Float(v) => write!(f, "{}", v),
            SqlParam::Integer(v) => write!(f, "{}", v),
            SqlParam::Bool(v) => write!(f, "{}", v),
            SqlParam::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            SqlParam::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        SqlParam::Text(s)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Integer(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Integer(i64::from(v))
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

/// Ordered mapping of placeholder name to value for one statement.
///
/// Names include the leading `:` exactly as they appear in the SQL text.
/// Lookups go through a name index, so binding stays linear in the number of
/// parameters.
#[derive(Debug, Clone, Default)]
pub struct BoundParams {
    entries: Vec<(String, SqlParam)>,
    index: HashMap<String, usize>,
}

impl PartialEq for BoundParams {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl BoundParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty parameter set with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Binds `value` to `name`. Names must be unique within one statement.
    pub fn bind(&mut self, name: impl Into<String>, value: SqlParam) -> StorageResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(RequestError::DuplicatePlaceholder { name }.into());
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        Ok(())
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&SqlParam> {
        self.index
            .get(name)
            .and_then(|&i| self.entries.get(i))
            .map(|(_, v)| v)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no parameters are bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlParam)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Placeholder names in binding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Renders the parameters as a JSON object, for logging and dry runs.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}
