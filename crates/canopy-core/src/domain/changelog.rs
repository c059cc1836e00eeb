//! Changeset and changelog aggregate types.
//!
//! A `ChangeLog` arrives here already flattened and validated by the
//! upstream loader: includes resolved, per-changeset `environments` and
//! `labels` inherited and non-empty. This crate does not re-check those
//! invariants.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::change::Change;

/// One named, versioned unit of forward + optional rollback operations.
///
/// `id` is the stable identity key: it decides audit-log membership,
/// duplicate detection, and rollback selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    /// Deployment environments this changeset is gated to. Case-insensitive;
    /// the literal `"All"` matches any execution environment.
    #[serde(default)]
    pub environments: Vec<String>,
    /// Secondary tags restricting which execution runs apply this changeset.
    /// Case-sensitive.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Pre-approved checksum overrides for intentionally edited changesets.
    #[serde(default, rename = "validCheckSum")]
    pub valid_checksums: Vec<String>,
    /// Forward operations, applied in order.
    #[serde(default)]
    pub changes: Vec<Change>,
    /// Rollback operations, applied in order. May be empty.
    #[serde(default)]
    pub rollback: Vec<Change>,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            environments: Vec::new(),
            labels: Vec::new(),
            valid_checksums: Vec::new(),
            changes: Vec::new(),
            rollback: Vec::new(),
        }
    }

    pub fn with_environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_rollback(mut self, rollback: Vec<Change>) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn with_valid_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.valid_checksums.push(checksum.into());
        self
    }
}

/// The full ordered migration sequence plus environment-group definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLog {
    /// Flattened changesets, in application order.
    #[serde(default)]
    pub change_sets: Vec<ChangeSet>,
    /// Group name → member environment names. Group keys match changeset
    /// `environments` entries; member comparison is case-sensitive.
    #[serde(default)]
    pub environment_groups: HashMap<String, Vec<String>>,
}

impl ChangeLog {
    pub fn new(change_sets: Vec<ChangeSet>) -> Self {
        Self {
            change_sets,
            environment_groups: HashMap::new(),
        }
    }

    pub fn with_environment_group<I, S>(mut self, group: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment_groups
            .insert(group.into(), members.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_checksums_use_legacy_wire_name() {
        let cs = ChangeSet::new("cs-1", "alice").with_valid_checksum("abc123");
        let json = serde_json::to_value(&cs).expect("serialize");
        assert_eq!(json["validCheckSum"], serde_json::json!(["abc123"]));
    }

    #[test]
    fn changeset_defaults_omitted_fields() {
        let cs: ChangeSet = serde_json::from_value(serde_json::json!({
            "id": "cs-1",
            "author": "alice",
        }))
        .expect("deserialize");
        assert!(cs.environments.is_empty());
        assert!(cs.changes.is_empty());
        assert!(cs.rollback.is_empty());
    }
}
