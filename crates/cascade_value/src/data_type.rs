//! Declared data types and coercion.

use crate::error::{ValueError, ValueResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The declared type of a column or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Float,
    /// Boolean flag.
    Boolean,
    /// Free text.
    Text,
    /// Date-time stored as `YYYY-MM-DD HH:MM:SS` text.
    Timestamp,
    /// Raw bytes.
    Blob,
}

impl DataType {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Text => "text",
            DataType::Timestamp => "timestamp",
            DataType::Blob => "blob",
        }
    }

    /// Returns true if `value` already has the representation this type uses.
    #[must_use]
    pub fn is_compatible(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (DataType::Integer, Value::Integer(_))
                | (DataType::Float, Value::Float(_))
                | (DataType::Boolean, Value::Bool(_))
                | (DataType::Text | DataType::Timestamp, Value::Text(_))
                | (DataType::Blob, Value::Bytes(_))
        )
    }

    /// Converts `value` to the representation this type uses.
    ///
    /// Null always passes through. Numeric text is parsed, booleans map to
    /// 0/1 and back, and integral floats narrow to integers.
    pub fn coerce(self, value: Value) -> ValueResult<Value> {
        if self.is_compatible(&value) {
            return Ok(value);
        }
        let target = self.name();
        let fail = |v: &Value| ValueError::coercion(format!("{v:?}"), target);

        match self {
            DataType::Integer => match &value {
                Value::Bool(b) => Ok(Value::Integer(i64::from(*b))),
                #[allow(clippy::cast_possible_truncation)]
                Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::Integer(*f as i64)),
                Value::Text(s) => parse_integer(s.trim()).ok_or_else(|| fail(&value)),
                _ => Err(fail(&value)),
            },
            DataType::Float => match &value {
                Value::Integer(_) => Ok(Value::Float(value.as_float().unwrap_or_default())),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| fail(&value)),
                _ => Err(fail(&value)),
            },
            DataType::Boolean => match &value {
                Value::Integer(n) => Ok(Value::Bool(*n != 0)),
                Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
                Value::Text(s) => parse_bool(s).map(Value::Bool).ok_or_else(|| fail(&value)),
                _ => Err(fail(&value)),
            },
            DataType::Text => match &value {
                Value::Bool(b) => Ok(Value::Text(if *b { "1" } else { "0" }.to_string())),
                Value::Integer(n) => Ok(Value::Text(n.to_string())),
                Value::Float(f) => Ok(Value::Text(f.to_string())),
                _ => Err(fail(&value)),
            },
            DataType::Timestamp => Err(fail(&value)),
            DataType::Blob => match value {
                Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Err(fail(&other)),
            },
        }
    }
}

fn parse_integer(s: &str) -> Option<Value> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Integer(n));
    }
    match s.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        Ok(f) if f.fract() == 0.0 && f.is_finite() => Some(Value::Integer(f as i64)),
        _ => None,
    }
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" | "smallint" => Ok(DataType::Integer),
            "float" | "double" | "decimal" | "numeric" | "real" => Ok(DataType::Float),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "text" | "string" | "varchar" | "char" => Ok(DataType::Text),
            "timestamp" | "datetime" | "date" => Ok(DataType::Timestamp),
            "blob" | "binary" | "bytes" => Ok(DataType::Blob),
            _ => Err(ValueError::unknown_data_type(s)),
        }
    }
}
