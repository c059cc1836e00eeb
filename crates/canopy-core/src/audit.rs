//! Persisted record of which changesets have run.
//!
//! Backed by one history node under the engine root, auto-created on first
//! access. Each applied changeset is an immediate child whose name is the
//! changeset id in URL-safe unpadded base64 — ids may contain arbitrary
//! characters, including path separators, and still map to a flat node name
//! — and whose value is the serialized [`AuditRecord`].

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use canopy_store::{CoordStore, StoreError};

use crate::domain::Result;

/// Wire record for one applied changeset.
///
/// `checksum` is `None` for records written before checksum tracking
/// existed; such records pass validation with a warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub author: String,
    pub executed_at_millis: i64,
    #[serde(default)]
    pub checksum: Option<String>,
}

/// The audit log: history-root listing, marking, and removal.
pub struct AuditLog {
    store: Arc<dyn CoordStore>,
    history_path: String,
}

impl AuditLog {
    pub fn new(store: Arc<dyn CoordStore>, history_path: impl Into<String>) -> Self {
        Self {
            store,
            history_path: history_path.into(),
        }
    }

    pub fn history_path(&self) -> &str {
        &self.history_path
    }

    async fn ensure_history_root(&self) -> Result<()> {
        if !self.store.exists(&self.history_path).await? {
            match self.store.create(&self.history_path, &[], true).await {
                Ok(()) => {}
                // Another runner raced us to it
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// All audit records, keyed by decoded changeset id.
    ///
    /// Children whose name fails to decode, or whose value fails to read or
    /// deserialize, are skipped with a logged warning rather than failing
    /// the whole listing.
    pub async fn list_all(&self) -> Result<HashMap<String, AuditRecord>> {
        self.ensure_history_root().await?;

        let mut executed = HashMap::new();
        for child in self.store.children(&self.history_path).await? {
            let Some(id) = decode_id(&child) else {
                warn!("Found invalid node in history path: {}", child);
                continue;
            };
            let node = format!("{}/{}", self.history_path, child);
            let record = match self.store.read(&node).await {
                Ok(bytes) => match serde_json::from_slice::<AuditRecord>(&bytes) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Failed to read history node {}: {}", child, e);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Failed to read history node {}: {}", child, e);
                    continue;
                }
            };
            executed.insert(id, record);
        }
        Ok(executed)
    }

    /// Decoded ids of all executed changesets.
    pub async fn executed_ids(&self) -> Result<Vec<String>> {
        self.ensure_history_root().await?;

        let mut ids = Vec::new();
        for child in self.store.children(&self.history_path).await? {
            match decode_id(&child) {
                Some(id) => ids.push(id),
                None => warn!("Found invalid node in history path: {}", child),
            }
        }
        Ok(ids)
    }

    /// Record a changeset as executed, stamped with the current time.
    ///
    /// Creates the history node, or overwrites it if the id was already
    /// marked (re-marking supports checksum backfill).
    pub async fn mark_executed(&self, id: &str, author: &str, checksum: Option<&str>) -> Result<()> {
        self.ensure_history_root().await?;

        let node = format!("{}/{}", self.history_path, encode_id(id));
        let record = AuditRecord {
            id: id.to_string(),
            author: author.to_string(),
            executed_at_millis: Utc::now().timestamp_millis(),
            checksum: checksum.map(str::to_string),
        };
        let bytes = serde_json::to_vec(&record)?;

        match self.store.create(&node, &bytes, false).await {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists { .. }) => {
                self.store.write(&node, &bytes).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a changeset's audit record. Already-absent is not an error.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let node = format!("{}/{}", self.history_path, encode_id(id));
        match self.store.delete(&node).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn encode_id(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

fn decode_id(name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(name.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}
