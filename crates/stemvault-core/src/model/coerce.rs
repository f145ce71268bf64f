//! Value coercion for producer-encoded snapshot fields
//!
//! The native-project parser emits most scalars as strings (`"0.85"`,
//! `"true"`) and sometimes wraps them as `{"Value": ...}`. These helpers
//! accept both forms and reject anything that is not an exact match.

use serde_json::Value;

/// Strip a single-key `{"Value": x}` wrapper
pub fn unwrap_value(value: &Value) -> &Value {
    match value {
        Value::Object(map) if map.len() == 1 => map.get("Value").unwrap_or(value),
        _ => value,
    }
}

/// Coerce a JSON number or numeric string to a finite `f64`
pub fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match unwrap_value(value) {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Coerce to an integral value (MIDI pitch)
pub fn as_i64(value: &Value) -> Option<i64> {
    let v = as_f64(value)?;
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Coerce a JSON boolean, `"true"`/`"false"` string, or `0`/`1`
pub fn as_bool(value: &Value) -> Option<bool> {
    match unwrap_value(value) {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Coerce a string or number to text (track ids are numeric in some producers)
pub fn as_text(value: &Value) -> Option<String> {
    match unwrap_value(value) {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Compact rendering of an offending value for error messages
pub fn render(value: &Value) -> String {
    let text = value.to_string();
    if text.len() > 64 {
        format!("{}...", &text[..text.char_indices().nth(61).map_or(text.len(), |(i, _)| i)])
    } else {
        text
    }
}
