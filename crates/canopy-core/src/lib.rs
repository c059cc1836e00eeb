//! Canopy Core Library
//!
//! Re-exports core components for programmatic access to the migration
//! engine: the change model, checksum engine, executor, audit log, lock
//! coordination, and the `update`/`rollback` workflows with their previews.

pub mod audit;
pub mod checksum;
pub mod domain;
pub mod engine;
pub mod executor;
pub mod inspect;
pub mod lock;
pub mod subst;
pub mod telemetry;

pub use audit::{AuditLog, AuditRecord};
pub use checksum::checksum;
pub use domain::{resolve_value, Change, ChangeLog, ChangeSet, MigrationError, Result};
pub use engine::{
    should_run, MigrationEngine, PreviewEntry, PreviewReport, RollbackOutcome, UpdateOutcome,
};
pub use executor::Executor;
pub use inspect::{DiffRenderer, InspectDirection, Inspector, NullDiffRenderer};
pub use lock::{LockCoordinator, LockGuard, DEFAULT_LOCK_TIMEOUT};
pub use subst::substitute;
pub use telemetry::init_tracing;

pub use canopy_store::{CoordStore, StoreError, StoreMutex, StoreResult};

/// Canopy version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
