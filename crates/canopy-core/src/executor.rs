//! Applies and rolls back one changeset's operation list.
//!
//! Operations run strictly in list order against the remote tree. There is
//! no transaction: a failure at operation N leaves operations 1..N-1
//! applied and uncompensated — reruns rely on the engine's idempotent skip.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use canopy_store::CoordStore;

use crate::domain::{resolve_value, Change, ChangeSet, Result};

/// Executes changeset operations against a [`CoordStore`].
pub struct Executor {
    store: Arc<dyn CoordStore>,
}

impl Executor {
    pub fn new(store: Arc<dyn CoordStore>) -> Self {
        Self { store }
    }

    /// Apply the changeset's forward operations in list order.
    pub async fn apply(&self, change_set: &ChangeSet) -> Result<()> {
        info!("Executing changeset: {}", change_set.id);
        for change in &change_set.changes {
            self.apply_change(change).await?;
        }
        Ok(())
    }

    /// Apply the changeset's rollback operations in list order.
    ///
    /// An empty rollback list is a successful no-op with a logged warning,
    /// not an error.
    pub async fn rollback(&self, change_set: &ChangeSet) -> Result<()> {
        info!("Rolling back changeset: {}", change_set.id);
        if change_set.rollback.is_empty() {
            warn!("No rollback defined for changeset: {}", change_set.id);
            return Ok(());
        }
        for change in &change_set.rollback {
            self.apply_change(change).await?;
        }
        Ok(())
    }

    async fn apply_change(&self, change: &Change) -> Result<()> {
        match change {
            Change::Create { path, data, file } => {
                info!("Creating node: {}", path);
                let value = resolve_value(data.as_deref(), file.as_deref())?;
                self.store.create(path, &value, true).await?;
            }
            Change::Update { path, data, file } => {
                info!("Updating node: {}", path);
                let value = resolve_value(data.as_deref(), file.as_deref())?;
                self.store.write(path, &value).await?;
            }
            Change::Delete { path } => {
                info!("Deleting node: {}", path);
                self.store.delete(path).await?;
            }
            Change::Rename { path, destination } => {
                info!("Renaming node from {} to {}", path, destination);
                self.rename_node(path, destination).await?;
            }
            Change::Upsert { path, data, file } => {
                info!("Upserting node: {}", path);
                let value = resolve_value(data.as_deref(), file.as_deref())?;
                if self.store.exists(path).await? {
                    self.store.write(path, &value).await?;
                } else {
                    self.store.create(path, &value, true).await?;
                }
            }
        }
        Ok(())
    }

    /// Depth-first subtree relocation: copy the source value to the
    /// destination, recurse into each child, then delete the source once its
    /// children have moved. Recursion depth equals subtree depth.
    fn rename_node<'a>(&'a self, source: &'a str, destination: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let value = self.store.read(source).await?;
            self.store.create(destination, &value, true).await?;

            for child in self.store.children(source).await? {
                let child_source = format!("{}/{}", source, child);
                let child_destination = format!("{}/{}", destination, child);
                self.rename_node(&child_source, &child_destination).await?;
            }
            self.store.delete(source).await?;
            Ok(())
        })
    }
}
