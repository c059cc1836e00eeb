//! In-memory fakes for the store traits (testing only)
//!
//! Provides `MemoryCoordStore`, an in-process tree that satisfies the
//! `CoordStore` and `StoreMutex` contracts without any external dependencies.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::traits::*;

// ---------------------------------------------------------------------------
// MemoryCoordStore
// ---------------------------------------------------------------------------

/// In-memory coordination tree backed by a `BTreeMap<path, value>`.
///
/// The root `/` is implicit and always present. Lock state lives in the
/// store, shared by every handle returned from [`CoordStore::mutex`], so
/// contention across tasks behaves like a shared remote backend.
#[derive(Debug, Default)]
pub struct MemoryCoordStore {
    nodes: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl MemoryCoordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored path, in tree order. Test-assertion helper.
    pub fn paths(&self) -> Vec<String> {
        self.nodes.lock().unwrap().keys().cloned().collect()
    }

    /// Parent path of `path`, or `None` when the parent is the root.
    fn parent(path: &str) -> Option<String> {
        let idx = path.rfind('/')?;
        if idx == 0 {
            None
        } else {
            Some(path[..idx].to_string())
        }
    }

    fn has_children(nodes: &BTreeMap<String, Vec<u8>>, path: &str) -> bool {
        let prefix = format!("{}/", path);
        nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }
}

#[async_trait]
impl CoordStore for MemoryCoordStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let nodes = self.nodes.lock().unwrap();
        Ok(path == "/" || nodes.contains_key(path))
    }

    async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let nodes = self.nodes.lock().unwrap();
        nodes.get(path).cloned().ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })
    }

    async fn write(&self, path: &str, value: &[u8]) -> StoreResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(path) {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        nodes.insert(path.to_string(), value.to_vec());
        Ok(())
    }

    async fn create(
        &self,
        path: &str,
        value: &[u8],
        create_missing_ancestors: bool,
    ) -> StoreResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if path == "/" || nodes.contains_key(path) {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
            });
        }
        if let Some(parent) = Self::parent(path) {
            if !nodes.contains_key(&parent) {
                if !create_missing_ancestors {
                    return Err(StoreError::MissingAncestor {
                        path: path.to_string(),
                    });
                }
                // Materialise missing ancestors root-down as empty nodes
                let mut missing = Vec::new();
                let mut cursor = Some(parent);
                while let Some(p) = cursor {
                    if nodes.contains_key(&p) {
                        break;
                    }
                    cursor = Self::parent(&p);
                    missing.push(p);
                }
                for p in missing.into_iter().rev() {
                    nodes.insert(p, Vec::new());
                }
            }
        }
        nodes.insert(path.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(path) {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        if Self::has_children(&nodes, path) {
            return Err(StoreError::NotEmpty {
                path: path.to_string(),
            });
        }
        nodes.remove(path);
        Ok(())
    }

    async fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        let nodes = self.nodes.lock().unwrap();
        if path != "/" && !nodes.contains_key(path) {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        Ok(nodes
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .map(|k| k[prefix.len()..].to_string())
            .collect())
    }

    fn mutex(&self, path: &str) -> Box<dyn StoreMutex> {
        Box::new(MemoryMutex {
            path: path.to_string(),
            locks: Arc::clone(&self.locks),
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryMutex
// ---------------------------------------------------------------------------

/// Polling mutex over the store's shared lock set.
#[derive(Debug)]
struct MemoryMutex {
    path: String,
    locks: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl StoreMutex for MemoryMutex {
    async fn acquire(&self, timeout: Duration) -> StoreResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut locks = self.locks.lock().unwrap();
                if locks.insert(self.path.clone()) {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn release(&self) -> StoreResult<()> {
        let mut locks = self.locks.lock().unwrap();
        if locks.remove(&self.path) {
            Ok(())
        } else {
            Err(StoreError::Mutex {
                path: self.path.clone(),
                reason: "released without holding".to_string(),
            })
        }
    }
}
