//! The closed set of tree operations a changeset can carry.
//!
//! Serialized with external tagging, so the wire shape is
//! `{"create": {"path": "/a", "data": "v"}}` — one key naming the operation,
//! wrapping its fields. Value-bearing operations resolve their payload from
//! exactly one of an inline `data` literal or an external `file` reference.

use serde::{Deserialize, Serialize};

use crate::domain::error::{MigrationError, Result};

/// One structural operation against the coordination tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    /// Create a new node (with missing ancestors). Fails if it exists.
    Create {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    /// Overwrite an existing node's value. Fails if it is absent.
    Update {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
    /// Remove a node. Fails if it is absent.
    Delete { path: String },
    /// Relocate a node and its whole subtree to `destination`.
    Rename { path: String, destination: String },
    /// Overwrite if present, create (with ancestors) if absent.
    Upsert {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },
}

impl Change {
    /// The node path this operation targets.
    pub fn path(&self) -> &str {
        match self {
            Change::Create { path, .. }
            | Change::Update { path, .. }
            | Change::Delete { path }
            | Change::Rename { path, .. }
            | Change::Upsert { path, .. } => path,
        }
    }
}

/// Resolve a change's byte payload from its `data`/`file` pair.
///
/// Exactly one source may be given: both is a configuration error, a `file`
/// is read from disk, inline `data` contributes its UTF-8 bytes, and neither
/// yields an empty value.
pub fn resolve_value(data: Option<&str>, file: Option<&str>) -> Result<Vec<u8>> {
    match (data, file) {
        (Some(_), Some(_)) => Err(MigrationError::Configuration(
            "cannot provide both 'data' and 'file'".to_string(),
        )),
        (None, Some(file)) => Ok(std::fs::read(file)?),
        (Some(data), None) => Ok(data.as_bytes().to_vec()),
        (None, None) => Ok(Vec::new()),
    }
}
