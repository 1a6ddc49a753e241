//! Text encoding for values stored in string columns.
//!
//! Attribute rows keep every value as a string. The stored form is a pure
//! function of the value and its declared type, so two values that encode
//! identically are treated as equal when comparing against a default.
//!
//! `Null` is written as a sentinel token rather than an SQL NULL: callers
//! rely on a missing row meaning "default", so an explicit null has to be
//! distinguishable from absence.

use crate::data_type::{parse_bool, DataType};
use crate::error::{ValueError, ValueResult};
use crate::value::Value;

/// Default token written for an explicit `Null`.
pub const DEFAULT_NULL_TOKEN: &str = "__NULL__";

/// Encodes values to and from their stored text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEncoding {
    null_token: String,
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::new(DEFAULT_NULL_TOKEN)
    }
}

impl TextEncoding {
    /// Creates an encoding using `null_token` for explicit nulls.
    pub fn new(null_token: impl Into<String>) -> Self {
        Self {
            null_token: null_token.into(),
        }
    }

    /// Returns the null sentinel.
    #[must_use]
    pub fn null_token(&self) -> &str {
        &self.null_token
    }

    /// Encodes `value` as declared type `data_type`.
    pub fn encode(&self, value: &Value, data_type: DataType) -> ValueResult<String> {
        let coerced = data_type.coerce(value.clone())?;
        Ok(match coerced {
            Value::Null => self.null_token.clone(),
            Value::Bool(b) => if b { "1" } else { "0" }.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s,
            Value::Bytes(b) => to_hex(&b),
        })
    }

    /// Decodes stored text back into a value of `data_type`.
    pub fn decode(&self, raw: &str, data_type: DataType) -> ValueResult<Value> {
        if raw == self.null_token {
            return Ok(Value::Null);
        }
        let target = data_type.name();
        match data_type {
            DataType::Integer => {
                if raw.trim().is_empty() {
                    return Ok(Value::Null);
                }
                data_type
                    .coerce(Value::Text(raw.to_string()))
                    .map_err(|_| ValueError::parse(raw, target))
            }
            DataType::Float => {
                if raw.trim().is_empty() {
                    return Ok(Value::Null);
                }
                raw.trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| ValueError::parse(raw, target))
            }
            DataType::Boolean => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| ValueError::parse(raw, target)),
            DataType::Text | DataType::Timestamp => Ok(Value::Text(raw.to_string())),
            DataType::Blob => from_hex(raw)
                .map(Value::Bytes)
                .ok_or_else(|| ValueError::parse(raw, target)),
        }
    }

    /// Returns true if `a` and `b` have the same stored form.
    #[must_use]
    pub fn same_encoding(&self, a: &Value, b: &Value, data_type: DataType) -> bool {
        match (self.encode(a, data_type), self.encode(b, data_type)) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|h| u8::from_str_radix(h, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn null_uses_sentinel() {
        let enc = TextEncoding::default();
        assert_eq!(enc.encode(&Value::Null, DataType::Integer).unwrap(), "__NULL__");
        assert_eq!(enc.decode("__NULL__", DataType::Text).unwrap(), Value::Null);
    }

    #[test]
    fn custom_sentinel() {
        let enc = TextEncoding::new("<nil>");
        assert_eq!(enc.encode(&Value::Null, DataType::Text).unwrap(), "<nil>");
        assert_eq!(
            enc.decode("__NULL__", DataType::Text).unwrap(),
            Value::Text("__NULL__".into())
        );
    }

    #[test]
    fn booleans_encode_as_digits() {
        let enc = TextEncoding::default();
        assert_eq!(enc.encode(&Value::Bool(true), DataType::Boolean).unwrap(), "1");
        assert_eq!(enc.encode(&Value::from("no"), DataType::Boolean).unwrap(), "0");
        assert_eq!(enc.decode("1", DataType::Boolean).unwrap(), Value::Bool(true));
    }

    #[test]
    fn numeric_formatting_normalises() {
        let enc = TextEncoding::default();
        assert!(enc.same_encoding(&Value::from("10"), &Value::Integer(10), DataType::Integer));
        assert!(!enc.same_encoding(&Value::from("11"), &Value::Integer(10), DataType::Integer));
        assert!(enc.same_encoding(&Value::from("0.50"), &Value::Float(0.5), DataType::Float));
    }

    #[test]
    fn blob_hex() {
        let enc = TextEncoding::default();
        let s = enc.encode(&Value::Bytes(vec![0, 255, 16]), DataType::Blob).unwrap();
        assert_eq!(s, "00ff10");
        assert_eq!(enc.decode(&s, DataType::Blob).unwrap(), Value::Bytes(vec![0, 255, 16]));
        assert!(enc.decode("abc", DataType::Blob).is_err());
    }

    #[test]
    fn empty_numeric_text_decodes_to_null() {
        let enc = TextEncoding::default();
        assert_eq!(enc.decode("", DataType::Integer).unwrap(), Value::Null);
    }

    proptest! {
        #[test]
        fn integers_survive_storage(n in any::<i64>()) {
            let enc = TextEncoding::default();
            let raw = enc.encode(&Value::Integer(n), DataType::Integer).unwrap();
            prop_assert_eq!(enc.decode(&raw, DataType::Integer).unwrap(), Value::Integer(n));
        }

        #[test]
        fn text_never_collides_with_sentinel(s in "[a-z ]{0,16}") {
            let enc = TextEncoding::default();
            let raw = enc.encode(&Value::Text(s.clone()), DataType::Text).unwrap();
            prop_assert_ne!(raw.as_str(), enc.null_token());
            prop_assert_eq!(enc.decode(&raw, DataType::Text).unwrap(), Value::Text(s));
        }
    }
}
