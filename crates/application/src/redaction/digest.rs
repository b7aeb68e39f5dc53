use std::fmt::Write;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of raw bytes.
pub(crate) fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);

    let mut digest = [0u8; 32];
    digest.copy_from_slice(hasher.finalize().as_slice());
    digest
}

/// Computes the lowercase hex SHA-256 digest of raw bytes.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    sha256(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}

/// Digest of a JSON value in canonical form.
///
/// Object keys are re-inserted in sorted order before serializing, so equal
/// values hash equal whatever key order the caller used.
#[must_use]
pub fn content_digest(value: &Value) -> String {
    sha256_hex(canonicalize(value).to_string().as_bytes())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(object.len());
            for key in keys {
                if let Some(nested) = object.get(key) {
                    sorted.insert(key.clone(), canonicalize(nested));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
