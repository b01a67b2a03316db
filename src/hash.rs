//! Content fingerprints for change detection.
//!
//! Every piece of incremental machinery in this crate (the state store's
//! page hashes, change-set identity, the builder's reuse decisions) rests on
//! one primitive: a deterministic fingerprint of a structured fragment.
//!
//! # Canonical form
//!
//! Fragments are serialized to JSON with object keys sorted recursively
//! before hashing, so two value-equal fragments hash identically no matter
//! how their map-like fields were assembled. Arrays keep their order; order
//! is meaningful for block lists and operation lists.
//!
//! The digest is SHA-256, rendered as lowercase hex. Nothing here depends on
//! memory addresses, map iteration order, or the clock, so fingerprints are
//! stable across runs and process restarts.
//!
//! # Failure mode
//!
//! Hashing a well-formed fragment never fails. A fragment that cannot be
//! serialized (a map with non-string keys, a failing `Serialize` impl) is a
//! programming error and surfaces as [`InvalidFragment`] at the call site.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A fragment that could not be serialized for hashing.
///
/// This indicates a malformed payload reaching the hasher, which is a bug in
/// the caller, not a recoverable condition.
#[derive(Error, Debug)]
#[error("fragment is not serializable: {0}")]
pub struct InvalidFragment(#[from] serde_json::Error);

/// SHA-256 over the canonical JSON form of `value`, as lowercase hex.
pub fn fingerprint(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

/// Fingerprint any serializable fragment.
///
/// Convenience wrapper that converts `fragment` to a JSON value first.
pub fn hash_fragment<T: Serialize>(fragment: &T) -> Result<String, InvalidFragment> {
    let value = serde_json::to_value(fragment)?;
    Ok(fingerprint(&value))
}

/// SHA-256 of raw output bytes, as lowercase hex.
///
/// Used by the builder for manifest entries; artifact bytes are already
/// canonical so no structural normalization applies.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// First 12 hex chars of a digest, for compact identifiers.
///
/// 48 bits is plenty for per-domain change-set and build ids; full digests
/// remain available wherever collisions would actually matter.
pub fn short_id(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}

/// Write `value` as canonical JSON: object keys sorted, no whitespace.
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
                // serde_json handles string escaping; a String never fails.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
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
        other => {
            out.push_str(&other.to_string());
        }
    }
}
