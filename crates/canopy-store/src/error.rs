//! Error types for canopy-store

use thiserror::Error;

/// Errors surfaced by a coordination-store backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Node does not exist
    #[error("Node not found: {path}")]
    NotFound { path: String },

    /// Node already exists
    #[error("Node already exists: {path}")]
    AlreadyExists { path: String },

    /// Parent node missing and ancestor creation was not requested
    #[error("Missing ancestor for: {path}")]
    MissingAncestor { path: String },

    /// Node still has children
    #[error("Node not empty: {path}")]
    NotEmpty { path: String },

    /// Mutex misuse (released without holding, backend lock loss)
    #[error("Mutex error at {path}: {reason}")]
    Mutex { path: String, reason: String },

    /// Connection-level failure
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}
