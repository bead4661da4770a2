//! Cell values and the conversions between their local and remote forms.
//!
//! Cells hold plain JSON values. A column carries conversions in four
//! directions (local get/set and remote read/write); a conversion is one of
//! a small closed set so that the inverse of any conversion is known and the
//! key column's round-trip invariant can be checked when the schema is
//! resolved, not at first use.

use std::fmt::Display;

use serde_json::Value;

use crate::errors::EngineError;

/// A value conversion applied when moving a cell between representations.
///
/// Conversions are lenient on the identity cases: a value already in the
/// target form passes through, and `Null` always passes through so that
/// null defaults survive every direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    IntToText,
    TextToInt,
}

impl Conversion {
    pub fn apply(&self, value: Value) -> Result<Value, EngineError> {
        match self {
            Conversion::Identity => Ok(value),
            Conversion::IntToText => match value {
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::String(s) => Ok(Value::String(s)),
                Value::Null => Ok(Value::Null),
                other => Err(EngineError::ConversionFailed {
                    expected: "text",
                    value: other.to_string(),
                }),
            },
            Conversion::TextToInt => match value {
                Value::String(s) => match s.parse::<i64>() {
                    Ok(parsed) => Ok(Value::from(parsed)),
                    Err(_) => Err(EngineError::ConversionFailed {
                        expected: "integer",
                        value: s,
                    }),
                },
                Value::Number(n) => Ok(Value::Number(n)),
                Value::Null => Ok(Value::Null),
                other => Err(EngineError::ConversionFailed {
                    expected: "integer",
                    value: other.to_string(),
                }),
            },
        }
    }

    pub fn inverse(&self) -> Conversion {
        match self {
            Conversion::Identity => Conversion::Identity,
            Conversion::IntToText => Conversion::TextToInt,
            Conversion::TextToInt => Conversion::IntToText,
        }
    }

    pub fn is_inverse_of(&self, other: &Conversion) -> bool {
        self.inverse() == *other
    }
}

/// The stored form of an associative row key.
///
/// JSON values are not hashable, so keys are restricted to the two types
/// that actually address rows. The stored form is what the key column's
/// local set conversion produces; the local form is recovered through the
/// local get conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    pub fn from_value(value: &Value) -> Result<KeyValue, EngineError> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(KeyValue::Int(i)),
                None => Err(EngineError::ConversionFailed {
                    expected: "integer or text key",
                    value: value.to_string(),
                }),
            },
            Value::String(s) => Ok(KeyValue::Text(s.clone())),
            other => Err(EngineError::ConversionFailed {
                expected: "integer or text key",
                value: other.to_string(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Int(i) => Value::from(*i),
            KeyValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> KeyValue {
        KeyValue::Int(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> KeyValue {
        KeyValue::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> KeyValue {
        KeyValue::Text(value)
    }
}
