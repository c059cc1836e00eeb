//! Read-only inspection of changesets for preview reports.
//!
//! Builds a human-readable block per changeset: a header, one section per
//! change with the operation and resolved path, warnings read from the live
//! tree (existence mismatches the apply would trip over), and a value-diff
//! body delegated to the external [`DiffRenderer`] collaborator. Inspection
//! never mutates the tree.

use std::collections::HashMap;

use canopy_store::CoordStore;

use crate::domain::{resolve_value, Change, ChangeSet, Result};
use crate::subst::substitute;

/// Boundary to the word-level diff collaborator.
///
/// `None` means "absent" on that side: `render(None, Some(v))` is a pure
/// addition, `render(Some(v), None)` a pure removal.
pub trait DiffRenderer: Send + Sync {
    fn render(&self, old: Option<&[u8]>, new: Option<&[u8]>) -> String;
}

/// Renderer that contributes no diff body. Stands in where the interactive
/// diff collaborator is not wired (non-interactive previews, tests).
pub struct NullDiffRenderer;

impl DiffRenderer for NullDiffRenderer {
    fn render(&self, _old: Option<&[u8]>, _new: Option<&[u8]>) -> String {
        String::new()
    }
}

/// Which operation list of the changeset is being previewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectDirection {
    Update,
    Rollback,
}

/// Renders preview blocks for changesets against the live tree.
pub struct Inspector<'a> {
    store: &'a dyn CoordStore,
    renderer: &'a dyn DiffRenderer,
}

impl<'a> Inspector<'a> {
    pub fn new(store: &'a dyn CoordStore, renderer: &'a dyn DiffRenderer) -> Self {
        Self { store, renderer }
    }

    /// Inspect with no variable substitution.
    pub async fn inspect(&self, change_set: &ChangeSet, direction: InspectDirection) -> String {
        self.inspect_with_variables(change_set, direction, &HashMap::new())
            .await
    }

    /// Build the preview block for one changeset.
    ///
    /// A failure while inspecting a single change is captured into that
    /// change's section; it does not abort the rest of the block.
    pub async fn inspect_with_variables(
        &self,
        change_set: &ChangeSet,
        direction: InspectDirection,
        variables: &HashMap<String, String>,
    ) -> String {
        let mut report = String::new();
        report.push_str(&format!("ChangeSet ID: {}\n", change_set.id));
        report.push_str(&format!("Author: {}\n", change_set.author));
        report.push_str(&format!(
            "Type: {}\n",
            match direction {
                InspectDirection::Update => "UPDATE",
                InspectDirection::Rollback => "ROLLBACK",
            }
        ));
        report.push_str("--------------------------------------------------\n");

        let changes = match direction {
            InspectDirection::Update => &change_set.changes,
            InspectDirection::Rollback => &change_set.rollback,
        };
        if changes.is_empty() {
            report.push_str("No changes defined.\n");
            return report;
        }

        for change in changes {
            match self.inspect_change(change, variables).await {
                Ok(section) => report.push_str(&section),
                Err(e) => {
                    report.push_str(&format!("Error inspecting {}: {}\n", change.path(), e))
                }
            }
        }
        report
    }

    async fn inspect_change(
        &self,
        change: &Change,
        variables: &HashMap<String, String>,
    ) -> Result<String> {
        let mut out = String::new();
        match change {
            Change::Create { path, data, file } => {
                let path = substitute(path, variables);
                out.push_str(&format!("CREATE {}\n", path));
                if self.store.exists(&path).await? {
                    out.push_str("WARNING: Node already exists!\n");
                }
                let new = self.resolve_substituted(data, file, variables)?;
                self.push_diff(&mut out, None, Some(&new));
            }
            Change::Update { path, data, file } => {
                let path = substitute(path, variables);
                out.push_str(&format!("UPDATE {}\n", path));
                let new = self.resolve_substituted(data, file, variables)?;
                if self.store.exists(&path).await? {
                    let old = self.store.read(&path).await?;
                    self.push_diff(&mut out, Some(&old), Some(&new));
                } else {
                    out.push_str("WARNING: Node does not exist!\n");
                    self.push_diff(&mut out, None, Some(&new));
                }
            }
            Change::Delete { path } => {
                let path = substitute(path, variables);
                out.push_str(&format!("DELETE {}\n", path));
                if self.store.exists(&path).await? {
                    let old = self.store.read(&path).await?;
                    self.push_diff(&mut out, Some(&old), None);
                } else {
                    out.push_str("WARNING: Node does not exist!\n");
                }
            }
            Change::Rename { path, destination } => {
                let path = substitute(path, variables);
                let destination = substitute(destination, variables);
                out.push_str(&format!("RENAME {} -> {}\n", path, destination));
                if !self.store.exists(&path).await? {
                    out.push_str("WARNING: Source node does not exist!\n");
                }
                if self.store.exists(&destination).await? {
                    out.push_str("WARNING: Destination node already exists!\n");
                }
            }
            Change::Upsert { path, data, file } => {
                let path = substitute(path, variables);
                out.push_str(&format!("UPSERT {}\n", path));
                let new = self.resolve_substituted(data, file, variables)?;
                if self.store.exists(&path).await? {
                    let old = self.store.read(&path).await?;
                    self.push_diff(&mut out, Some(&old), Some(&new));
                } else {
                    self.push_diff(&mut out, None, Some(&new));
                }
            }
        }
        Ok(out)
    }

    fn resolve_substituted(
        &self,
        data: &Option<String>,
        file: &Option<String>,
        variables: &HashMap<String, String>,
    ) -> Result<Vec<u8>> {
        let data = data.as_deref().map(|d| substitute(d, variables));
        let file = file.as_deref().map(|f| substitute(f, variables));
        resolve_value(data.as_deref(), file.as_deref())
    }

    fn push_diff(&self, out: &mut String, old: Option<&[u8]>, new: Option<&[u8]>) {
        let diff = self.renderer.render(old, new);
        if !diff.is_empty() {
            out.push_str(&diff);
            if !diff.ends_with('\n') {
                out.push('\n');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store::fakes::MemoryCoordStore;

    /// Renders `old -> new` lengths so tests can see which sides were passed.
    struct ProbeRenderer;

    impl DiffRenderer for ProbeRenderer {
        fn render(&self, old: Option<&[u8]>, new: Option<&[u8]>) -> String {
            format!(
                "diff old={:?} new={:?}",
                old.map(|b| b.len()),
                new.map(|b| b.len())
            )
        }
    }

    #[tokio::test]
    async fn create_on_existing_node_warns() {
        let store = MemoryCoordStore::new();
        store.create("/app/flag", b"on", true).await.expect("seed");

        let inspector = Inspector::new(&store, &ProbeRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice").with_changes(vec![Change::Create {
            path: "/app/flag".to_string(),
            data: Some("off".to_string()),
            file: None,
        }]);

        let report = inspector.inspect(&cs, InspectDirection::Update).await;
        assert!(report.contains("CREATE /app/flag"));
        assert!(report.contains("WARNING: Node already exists!"));
        assert!(report.contains("diff old=None new=Some(3)"));
    }

    #[tokio::test]
    async fn update_of_existing_node_diffs_old_against_new() {
        let store = MemoryCoordStore::new();
        store.create("/app/flag", b"on", true).await.expect("seed");

        let inspector = Inspector::new(&store, &ProbeRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice").with_changes(vec![Change::Update {
            path: "/app/flag".to_string(),
            data: Some("offff".to_string()),
            file: None,
        }]);

        let report = inspector.inspect(&cs, InspectDirection::Update).await;
        assert!(report.contains("UPDATE /app/flag"));
        assert!(!report.contains("WARNING"));
        assert!(report.contains("diff old=Some(2) new=Some(5)"));
    }

    #[tokio::test]
    async fn rename_warns_on_missing_source_and_present_destination() {
        let store = MemoryCoordStore::new();
        store.create("/dst", b"v", true).await.expect("seed");

        let inspector = Inspector::new(&store, &NullDiffRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice").with_changes(vec![Change::Rename {
            path: "/src".to_string(),
            destination: "/dst".to_string(),
        }]);

        let report = inspector.inspect(&cs, InspectDirection::Update).await;
        assert!(report.contains("RENAME /src -> /dst"));
        assert!(report.contains("WARNING: Source node does not exist!"));
        assert!(report.contains("WARNING: Destination node already exists!"));
    }

    #[tokio::test]
    async fn rollback_direction_reads_rollback_list() {
        let store = MemoryCoordStore::new();
        let inspector = Inspector::new(&store, &NullDiffRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice")
            .with_changes(vec![Change::Delete {
                path: "/a".to_string(),
            }])
            .with_rollback(vec![Change::Create {
                path: "/a".to_string(),
                data: Some("v".to_string()),
                file: None,
            }]);

        let report = inspector.inspect(&cs, InspectDirection::Rollback).await;
        assert!(report.contains("Type: ROLLBACK"));
        assert!(report.contains("CREATE /a"));
    }

    #[tokio::test]
    async fn empty_rollback_list_reports_no_changes() {
        let store = MemoryCoordStore::new();
        let inspector = Inspector::new(&store, &NullDiffRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice");

        let report = inspector.inspect(&cs, InspectDirection::Rollback).await;
        assert!(report.contains("No changes defined."));
    }

    #[tokio::test]
    async fn variables_expand_in_paths_and_data() {
        let store = MemoryCoordStore::new();
        let inspector = Inspector::new(&store, &NullDiffRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice").with_changes(vec![Change::Create {
            path: "/services/${env}/flag".to_string(),
            data: Some("${env}-on".to_string()),
            file: None,
        }]);

        let variables = [("env".to_string(), "prod".to_string())].into_iter().collect();
        let report = inspector
            .inspect_with_variables(&cs, InspectDirection::Update, &variables)
            .await;
        assert!(report.contains("CREATE /services/prod/flag"));
    }

    #[tokio::test]
    async fn bad_payload_config_is_captured_in_section() {
        let store = MemoryCoordStore::new();
        let inspector = Inspector::new(&store, &NullDiffRenderer);
        let cs = crate::domain::ChangeSet::new("cs-1", "alice").with_changes(vec![Change::Create {
            path: "/a".to_string(),
            data: Some("x".to_string()),
            file: Some("/tmp/x".to_string()),
        }]);

        let report = inspector.inspect(&cs, InspectDirection::Update).await;
        assert!(report.contains("Error inspecting /a"));
    }
}
