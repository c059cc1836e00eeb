//! Bounded-wait mutual exclusion for migration runs.
//!
//! One fixed lock location under the engine root guards every mutating
//! entry point, giving at-most-one-writer semantics across all processes
//! sharing that root. Acquisition failure aborts the run before any
//! mutation; release runs on every exit path.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use canopy_store::{CoordStore, StoreMutex};

use crate::domain::{MigrationError, Result};

/// Default time a runner waits for the migration lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Acquires the migration lock at a fixed store path.
pub struct LockCoordinator {
    store: Arc<dyn CoordStore>,
    lock_path: String,
    timeout: Duration,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn CoordStore>, lock_path: impl Into<String>) -> Self {
        Self {
            store,
            lock_path: lock_path.into(),
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the acquire timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn lock_path(&self) -> &str {
        &self.lock_path
    }

    /// Take the lock or fail with [`MigrationError::LockAcquisition`].
    ///
    /// The returned guard must be released via [`LockGuard::release`] once
    /// the locked section finishes, whatever its outcome.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let mutex = self.store.mutex(&self.lock_path);
        if !mutex.acquire(self.timeout).await? {
            return Err(MigrationError::LockAcquisition {
                path: self.lock_path.clone(),
                timeout_secs: self.timeout.as_secs(),
            });
        }
        Ok(LockGuard {
            mutex,
            lock_path: self.lock_path.clone(),
        })
    }
}

/// A held migration lock.
pub struct LockGuard {
    mutex: Box<dyn StoreMutex>,
    lock_path: String,
}

impl LockGuard {
    /// Release the lock. A release failure is logged and swallowed so it
    /// never masks the run's primary outcome.
    pub async fn release(self) {
        if let Err(e) = self.mutex.release().await {
            warn!("Failed to release migration lock at {}: {}", self.lock_path, e);
        }
    }
}
