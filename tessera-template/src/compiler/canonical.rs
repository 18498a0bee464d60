//! Canonical JSON
//!
//! Object keys sorted by byte order at every level, no insignificant
//! whitespace. Sorting is done here rather than relying on the map type
//! `serde_json` happens to be built with.

use serde_json::{Map, Value};

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, item) in entries {
                sorted.insert(key.clone(), canonicalize(item));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

/// Compact canonical serialization.
pub fn to_canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Pretty-printed canonical serialization.
pub fn to_canonical_pretty(value: &Value) -> String {
    format!("{:#}", canonicalize(value))
}

/// `text` as a quoted, escaped string literal.
pub fn string_literal(text: &str) -> String {
    Value::String(text.to_owned()).to_string()
}
