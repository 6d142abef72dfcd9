// src/utils/serialization.rs
//! Serialization utilities for the credential system.
//!
//! Provides:
//! - JSON serialization helpers used by the file stores
//! - Canonical JSON (recursively sorted object keys, no whitespace) used as
//!   the signing input for linked-data proofs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializes a value to pretty-printed JSON, the on-disk format of every
/// JSON document this system writes.
///
/// # Errors
/// Returns `serde_json::Error` if serialization fails.
pub fn to_pretty_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Deserializes a value from a JSON string.
///
/// # Note
/// The lifetime parameter allows borrowing data from the input string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

/// Renders a JSON value canonically: object keys sorted at every depth,
/// compact separators. Two structurally equal values always produce the same
/// bytes regardless of the order their keys were inserted in.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a plain string cannot fail.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
