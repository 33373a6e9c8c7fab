//! Stable config hashing
//!
//! Configs are hashed over a canonical JSON rendering (object keys sorted, no
//! whitespace) so that key order and formatting never change the hash.

use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value canonically: object keys sorted, no whitespace.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
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

/// SHA-256 (hex) of the canonical rendering of a config value.
#[must_use]
pub fn hash_config(config: &Value) -> String {
    let digest = Sha256::digest(canonical_json(config).as_bytes());
    hex::encode(digest)
}

/// Hash any serializable config through its JSON representation.
pub fn hash_serializable<T: Serialize>(config: &T) -> Result<String> {
    let value = serde_json::to_value(config)
        .map_err(|e| Error::serialization(format!("Failed to encode config: {e}")))?;
    Ok(hash_config(&value))
}
