//! Domain-level error taxonomy for Canopy.

use canopy_store::StoreError;

/// Canopy migration errors.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A change named both (or neither, where one is required) of its
    /// payload sources.
    #[error("invalid change configuration: {0}")]
    Configuration(String),

    /// The migration lock could not be obtained within the timeout.
    #[error("could not acquire migration lock at {path} within {timeout_secs}s")]
    LockAcquisition { path: String, timeout_secs: u64 },

    /// The same changeset id appeared twice in one update run.
    #[error("duplicate changeset id detected in this run: {id}")]
    DuplicateChangeSetId { id: String },

    /// An already-applied changeset was edited without a checksum override.
    #[error("checksum mismatch for changeset {id}: stored {stored}, calculated {calculated}")]
    ChecksumMismatch {
        id: String,
        stored: String,
        calculated: String,
    },

    /// A store operation failed while applying a changeset. Operations
    /// already applied for this changeset are not compensated.
    #[error("failed to apply changeset {id}: {source}")]
    Apply {
        id: String,
        #[source]
        source: Box<MigrationError>,
    },

    /// A store operation failed while rolling back a changeset. Its audit
    /// record is left intact.
    #[error("failed to roll back changeset {id}: {source}")]
    Rollback {
        id: String,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Canopy migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_names_both_checksums() {
        let err = MigrationError::ChecksumMismatch {
            id: "cs-7".to_string(),
            stored: "abc123".to_string(),
            calculated: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cs-7"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn apply_error_carries_changeset_id() {
        let err = MigrationError::Apply {
            id: "cs-3".to_string(),
            source: Box::new(MigrationError::Store(StoreError::NotFound {
                path: "/a".to_string(),
            })),
        };
        let msg = err.to_string();
        assert!(msg.contains("cs-3"));
        assert!(msg.contains("failed to apply"));
    }
}
