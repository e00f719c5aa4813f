//! Content checksums over canonicalized JSON.
//!
//! The canonical form writes object keys in sorted order at every depth,
//! so two values that differ only in key order hash identically. Depth is
//! bounded; pathological nesting is rejected rather than overflowing the
//! stack.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use harvester_core::{HarvesterError, HarvesterResult};

const MAX_CANONICAL_DEPTH: usize = 128;

/// Reject values the cache refuses to store: nothing (`null`) and
/// structures nested beyond the canonicalization bound.
pub fn validate_data(value: &Value) -> HarvesterResult<()> {
    if value.is_null() {
        return Err(HarvesterError::validation_error(
            "cannot cache null data",
        ));
    }
    check_depth(value, 0)
}

fn check_depth(value: &Value, depth: usize) -> HarvesterResult<()> {
    if depth > MAX_CANONICAL_DEPTH {
        return Err(HarvesterError::validation_error(
            "data is nested too deeply to canonicalize",
        ));
    }
    match value {
        Value::Array(items) => {
            for item in items {
                check_depth(item, depth + 1)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                check_depth(item, depth + 1)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// SHA-256 hex digest of the canonical JSON encoding of `data`.
pub fn checksum<T: Serialize>(data: &T) -> HarvesterResult<String> {
    let value = serde_json::to_value(data)?;
    check_depth(&value, 0)?;

    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex_encode(&hasher.finalize()))
}

/// Short digest for embedding in keys (first 16 hex chars).
pub fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hex_encode(&hasher.finalize());
    digest[..16].to_string()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
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
        other => out.push_str(&other.to_string()),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
