use crate::error::{Error, Result};
use serde_json::Value;

/// Name of a JSON value's type, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Coerce a live KV value into the plaintext string it must be.
pub fn coerce_plaintext<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| Error::UnexpectedValueType {
        key: key.to_string(),
        found: value_kind(value),
    })
}
