//! Client trait definitions for the coordination store
//!
//! These traits are the engine's only view of the remote tree:
//! - `CoordStore`: node CRUD + child listing over `/`-separated paths
//! - `StoreMutex`: bounded-wait distributed mutual exclusion
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// CoordStore — remote node tree
// ---------------------------------------------------------------------------

/// Remote hierarchical node store.
///
/// Paths are absolute and `/`-separated (`/app/config/flag`). The root `/`
/// always exists. Values are opaque byte strings.
///
/// Guarantees:
/// - Each call is an individual remote operation; there is no multi-node
///   atomicity across calls.
/// - `create` with `create_missing_ancestors` materialises absent ancestors
///   as empty nodes before creating the leaf.
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Whether a node exists at `path`.
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Read the value at `path`. `StoreError::NotFound` if absent.
    async fn read(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Overwrite the value of an existing node. `StoreError::NotFound` if absent.
    async fn write(&self, path: &str, value: &[u8]) -> StoreResult<()>;

    /// Create a node with the given value. `StoreError::AlreadyExists` if the
    /// node is present; `StoreError::MissingAncestor` if a parent is absent
    /// and `create_missing_ancestors` is false.
    async fn create(
        &self,
        path: &str,
        value: &[u8],
        create_missing_ancestors: bool,
    ) -> StoreResult<()>;

    /// Delete a childless node. `StoreError::NotFound` if absent,
    /// `StoreError::NotEmpty` if it still has children.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Immediate child names of `path` (names, not full paths).
    /// `StoreError::NotFound` if the node is absent.
    async fn children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Handle to the distributed mutex anchored at `path`.
    fn mutex(&self, path: &str) -> Box<dyn StoreMutex>;
}

// ---------------------------------------------------------------------------
// StoreMutex — distributed mutual exclusion
// ---------------------------------------------------------------------------

/// Bounded-wait mutual exclusion over a shared lock location.
///
/// Guarantees:
/// - At most one holder per lock path across all processes sharing the store.
/// - `acquire` blocks up to `timeout` and reports whether the lock was taken;
///   it never errors merely because the lock is contended.
#[async_trait]
pub trait StoreMutex: Send + Sync {
    /// Try to take the mutex, waiting up to `timeout`. Returns whether it was
    /// obtained.
    async fn acquire(&self, timeout: Duration) -> StoreResult<bool>;

    /// Release a previously acquired mutex.
    async fn release(&self) -> StoreResult<()>;
}
