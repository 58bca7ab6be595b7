//! Scalar values and result rows
//!
//! [`SqlValue`] is both the positional parameter type accepted by executors and
//! the column type of fetched rows. Parameters are scalars or null only.

use super::error::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Scalar SQL value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer
    Long(i64),
    /// 64-bit floating point
    Double(f64),
    /// Text value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Long(v) => Some(*v != 0),
            SqlValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Some(true),
                "false" | "f" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get the value as an i64
    ///
    /// Doubles convert only when integral and within range.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            SqlValue::Long(v) => Some(*v),
            SqlValue::Double(v)
                if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
            {
                Some(*v as i64)
            }
            SqlValue::Double(_) => None,
            SqlValue::String(s) => s.parse().ok(),
            SqlValue::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get the value as an f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            SqlValue::Double(v) => Some(*v),
            SqlValue::Long(v) => Some(*v as f64),
            SqlValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text of a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the raw bytes of a Bytes or String value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Bytes(b) => Some(b),
            SqlValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Text form used when a value is read back as an identifier.
    ///
    /// Returns `None` for null, `false` and empty text.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null | SqlValue::Bool(false) => None,
            SqlValue::Bool(true) => Some("1".to_string()),
            SqlValue::Long(v) => Some(v.to_string()),
            SqlValue::Double(v) => Some(v.to_string()),
            SqlValue::String(s) if s.is_empty() => None,
            SqlValue::String(s) => Some(s.clone()),
            SqlValue::Bytes(b) if b.is_empty() => None,
            SqlValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Long(_) => "long",
            SqlValue::Double(_) => "double",
            SqlValue::String(_) => "string",
            SqlValue::Bytes(_) => "bytes",
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "null"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Long(v) => write!(f, "{}", v),
            SqlValue::Double(v) => write!(f, "{}", v),
            SqlValue::String(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Long(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Long(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Long(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => SqlValue::Null,
        }
    }
}

impl TryFrom<serde_json::Value> for SqlValue {
    type Error = StorageError;

    /// Structured JSON (arrays, objects) has no scalar form and is rejected.
    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(SqlValue::Null),
            Value::Bool(v) => Ok(SqlValue::Bool(v)),
            Value::Number(n) => match n.as_i64() {
                Some(v) => Ok(SqlValue::Long(v)),
                None => n.as_f64().map(SqlValue::Double).ok_or_else(|| {
                    StorageError::incorrect_parameter_cast(format!(
                        "\"{}\" can't be represented as a number",
                        n
                    ))
                }),
            },
            Value::String(s) => Ok(SqlValue::String(s)),
            other @ (Value::Array(_) | Value::Object(_)) => {
                Err(StorageError::incorrect_parameter_cast(format!(
                    "\"{}\" must be converted to a scalar before binding",
                    other
                )))
            }
        }
    }
}

/// A fetched row: columns in select order with their values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `capacity` columns
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a column; a repeated name replaces the earlier value
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter().position(|c| *c == column) {
            Some(index) => self.values[index] = value,
            None => {
                self.columns.push(column);
                self.values.push(value);
            }
        }
    }

    /// Builder-style [`Row::insert`]
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Value of the named column
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|index| &self.values[index])
    }

    /// Value of the first selected column
    pub fn first(&self) -> Option<&SqlValue> {
        self.values.first()
    }

    /// Column names in select order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Iterate over `(column, value)` pairs in select order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Apply `f` to every value, keeping column names
    pub fn map_values(self, f: impl FnMut(SqlValue) -> SqlValue) -> Self {
        Self {
            columns: self.columns,
            values: self.values.into_iter().map(f).collect(),
        }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}
