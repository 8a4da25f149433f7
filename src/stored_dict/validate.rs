//! JSON-compatibility checks for stored entries.
//!
//! Stored dictionaries accept strings, numbers, booleans, null, sequences and
//! mappings whose keys are scalars. YAML tags and non-scalar mapping keys have no
//! JSON representation and are rejected before they reach the cache.

use crate::error::{AppResult, BitsError};
use serde::Serialize;
use serde_yaml::Value;

/// Converts `value` into the stored value model, naming `key` on failure.
pub fn to_value<V: Serialize>(key: &Value, value: V) -> AppResult<Value> {
    serde_yaml::to_value(value).map_err(|e| BitsError::Serialization {
        key: describe(key),
        reason: format!("value is not JSON serializable: {e}"),
    })
}

/// Checks that `key` and `value` can be written as JSON.
pub fn check_entry(key: &Value, value: &Value) -> AppResult<()> {
    check_key(key)
        .and_then(|()| check_value(value))
        .map_err(|reason| BitsError::Serialization {
            key: describe(key),
            reason,
        })
}

fn check_key(key: &Value) -> Result<(), String> {
    match key {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        other => Err(format!(
            "keys must be str, int, float, bool or None, not {}",
            kind(other)
        )),
    }
}

fn check_value(value: &Value) -> Result<(), String> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
        Value::Sequence(items) => items.iter().try_for_each(check_value),
        Value::Mapping(map) => map.iter().try_for_each(|(k, v)| {
            check_key(k)?;
            check_value(v)
        }),
        Value::Tagged(tagged) => Err(format!(
            "Object of type {} is not JSON serializable",
            tagged.tag
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Human-readable rendering of a key for messages and logs.
pub fn describe(key: &Value) -> String {
    match key {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}
