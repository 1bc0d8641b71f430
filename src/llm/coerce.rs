//! Flexible coercion of model output.
//!
//! Models routinely return an enum-ish field as a bare string, number or bool
//! where the schema asked for an object, or a number as a quoted string.
//! These helpers absorb that instead of treating it as a hard error.

use serde_json::Value;

/// Read a field as a string, accepting any scalar.
///
/// `null` and missing fields return `None`; objects and arrays are not
/// coerced.
pub fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a field as an f64, accepting numbers and numeric strings.
pub fn f64_field(value: &Value, field: &str) -> Option<f64> {
    match value.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Read a field as a bool, accepting booleans, 0/1 and common yes/no strings.
pub fn bool_field(value: &Value, field: &str) -> Option<bool> {
    match value.get(field)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "t" => Some(true),
            "false" | "no" | "n" | "0" | "f" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Normalize a value that should have been `{ "<key>": ... }` but may have
/// come back as a bare scalar.
///
/// Objects pass through unchanged; scalars are wrapped under `key`; anything
/// else returns `None`.
pub fn object_or_wrap(value: &Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(_) => Some(value.clone()),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            Some(serde_json::json!({ key: value }))
        }
        _ => None,
    }
}

/// Read a confidence field, clamped to [0, 1] with a default when absent.
pub fn confidence_field(value: &Value, field: &str, default: f64) -> f64 {
    f64_field(value, field).unwrap_or(default).clamp(0.0, 1.0)
}
