//! Deterministic changeset checksums.
//!
//! A changeset's checksum is the SHA-256 hex digest of
//! `id + ":" + author + ":" + canonical(changes)`, where `canonical` is the
//! compact JSON serialization of the change list with object keys sorted
//! alphabetically at every level, so the digest is independent of map
//! iteration order. The digest detects accidental or unauthorized edits to
//! already-applied changesets; it is not a security boundary.

use sha2::{Digest, Sha256};

use crate::domain::{ChangeSet, Result};

/// Recursively sort JSON object keys alphabetically.
fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys).collect())
        }
        other => other.clone(),
    }
}

/// Compute the hex checksum of a changeset's forward operations.
///
/// Identical logical content always yields an identical checksum, regardless
/// of run, process, or map ordering.
pub fn checksum(change_set: &ChangeSet) -> Result<String> {
    let changes = serde_json::to_value(&change_set.changes)?;
    let canonical = serde_json::to_string(&sort_keys(&changes))?;
    let raw = format!("{}:{}:{}", change_set.id, change_set.author, canonical);

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
