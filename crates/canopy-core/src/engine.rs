//! Migration engine: the `update`/`rollback` workflows and their previews.
//!
//! Orchestrates the audit log, checksum verification, eligibility gating,
//! and the executor into lock-guarded runs. Changesets are processed
//! strictly sequentially in changelog order — later changesets may depend
//! on tree state left by earlier ones. The engine holds no state between
//! calls; the "ids seen this run" set lives and dies with one invocation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use canopy_store::CoordStore;

use crate::audit::{AuditLog, AuditRecord};
use crate::checksum::checksum;
use crate::domain::{ChangeLog, ChangeSet, MigrationError, Result};
use crate::executor::Executor;
use crate::inspect::{DiffRenderer, InspectDirection, Inspector};
use crate::lock::LockCoordinator;

/// Result of an `update` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Ids applied by this run, in changelog order.
    pub applied: Vec<String>,
    /// Changesets skipped because they were already in the audit log.
    pub skipped_executed: usize,
    /// Changesets skipped by the environment/label gate.
    pub skipped_ineligible: usize,
}

/// Result of a `rollback` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Ids rolled back, newest first.
    pub rolled_back: Vec<String>,
}

/// One rendered preview block for a pending changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub id: String,
    pub report: String,
}

/// Result of a non-mutating preview.
#[derive(Debug, Clone, Default)]
pub struct PreviewReport {
    /// Rendered blocks for changesets the real run would process.
    pub pending: Vec<PreviewEntry>,
    /// Checksum validation failures, reported instead of aborting the call.
    pub validation_errors: Vec<String>,
    /// Ids that appear more than once in the changelog.
    pub duplicate_ids: Vec<String>,
}

impl PreviewReport {
    /// Whether the corresponding real run would change anything.
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// The migration engine for one store root.
///
/// All mutating entry points are wrapped end-to-end by the lock
/// coordinator; previews are advisory, lock-free reads.
pub struct MigrationEngine {
    store: Arc<dyn CoordStore>,
    executor: Executor,
    audit: AuditLog,
    lock: LockCoordinator,
}

impl MigrationEngine {
    /// Engine rooted at `root_path`. The audit history lives at
    /// `<root>/history`, the migration lock at `<root>/lock`.
    pub fn new(store: Arc<dyn CoordStore>, root_path: &str) -> Self {
        let root = root_path.trim_end_matches('/');
        Self {
            executor: Executor::new(Arc::clone(&store)),
            audit: AuditLog::new(Arc::clone(&store), format!("{}/history", root)),
            lock: LockCoordinator::new(Arc::clone(&store), format!("{}/lock", root)),
            store,
        }
    }

    /// Override the lock-acquire timeout (default 60 s).
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock = self.lock.with_timeout(timeout);
        self
    }

    /// The engine's audit log (operator tooling, tests).
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // update
    // -----------------------------------------------------------------------

    /// Apply every pending, eligible changeset in changelog order.
    pub async fn update(
        &self,
        changelog: &ChangeLog,
        environment: &str,
        labels: &[String],
    ) -> Result<UpdateOutcome> {
        let guard = self.lock.acquire().await?;
        let result = self.update_locked(changelog, environment, labels).await;
        guard.release().await;
        result
    }

    async fn update_locked(
        &self,
        changelog: &ChangeLog,
        environment: &str,
        labels: &[String],
    ) -> Result<UpdateOutcome> {
        info!("Lock acquired. Checking for migrations...");
        let mut executed = self.audit.list_all().await?;
        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut outcome = UpdateOutcome::default();

        for change_set in &changelog.change_sets {
            if seen_this_run.contains(&change_set.id) {
                return Err(MigrationError::DuplicateChangeSetId {
                    id: change_set.id.clone(),
                });
            }

            let current = checksum(change_set)?;

            if let Some(record) = executed.get(&change_set.id) {
                verify_checksum(change_set, &current, record.checksum.as_deref())?;
                debug!("Changeset {} already executed. Skipping.", change_set.id);
                // Skipped changesets still count as seen, so a later
                // duplicate of their id is caught
                seen_this_run.insert(change_set.id.clone());
                outcome.skipped_executed += 1;
                continue;
            }

            if !should_run(change_set, environment, labels, &changelog.environment_groups) {
                debug!(
                    "Changeset {} ignored due to environment/label mismatch.",
                    change_set.id
                );
                outcome.skipped_ineligible += 1;
                continue;
            }

            info!("Applying changeset: {}", change_set.id);
            if let Err(e) = self.executor.apply(change_set).await {
                error!("Failed to apply changeset {}: {}", change_set.id, e);
                return Err(as_apply_failure(change_set.id.clone(), e));
            }
            self.audit
                .mark_executed(&change_set.id, &change_set.author, Some(&current))
                .await?;

            seen_this_run.insert(change_set.id.clone());
            executed.insert(
                change_set.id.clone(),
                AuditRecord {
                    id: change_set.id.clone(),
                    author: change_set.author.clone(),
                    executed_at_millis: Utc::now().timestamp_millis(),
                    checksum: Some(current),
                },
            );
            outcome.applied.push(change_set.id.clone());
            info!("Changeset {} applied successfully.", change_set.id);
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // rollback
    // -----------------------------------------------------------------------

    /// Roll back the last `count` applied changesets, newest first.
    pub async fn rollback(&self, changelog: &ChangeLog, count: usize) -> Result<RollbackOutcome> {
        let guard = self.lock.acquire().await?;
        let result = self.rollback_locked(changelog, count).await;
        guard.release().await;
        result
    }

    async fn rollback_locked(
        &self,
        changelog: &ChangeLog,
        count: usize,
    ) -> Result<RollbackOutcome> {
        info!("Lock acquired. Processing rollback...");
        let candidates = self.rollback_candidates(changelog, count).await?;

        if candidates.is_empty() {
            info!("No executed changesets found to roll back.");
            return Ok(RollbackOutcome::default());
        }

        let mut outcome = RollbackOutcome::default();
        for change_set in candidates {
            info!("Rolling back changeset: {}", change_set.id);
            if let Err(e) = self.executor.rollback(change_set).await {
                error!("Failed to roll back changeset {}: {}", change_set.id, e);
                return Err(MigrationError::Rollback {
                    id: change_set.id.clone(),
                    source: Box::new(e),
                });
            }
            self.audit.remove(&change_set.id).await?;
            outcome.rolled_back.push(change_set.id.clone());
            info!("Changeset {} rolled back successfully.", change_set.id);
        }
        Ok(outcome)
    }

    /// The last `count` changesets present in the audit log, walking the
    /// changelog in reverse. Never-applied changesets are skipped, not
    /// counted.
    async fn rollback_candidates<'a>(
        &self,
        changelog: &'a ChangeLog,
        count: usize,
    ) -> Result<Vec<&'a ChangeSet>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let executed = self.audit.list_all().await?;

        let mut selected = Vec::new();
        for change_set in changelog.change_sets.iter().rev() {
            if executed.contains_key(&change_set.id) {
                selected.push(change_set);
                if selected.len() >= count {
                    break;
                }
            }
        }
        Ok(selected)
    }

    // -----------------------------------------------------------------------
    // previews
    // -----------------------------------------------------------------------

    /// Preview what [`MigrationEngine::update`] would do, without mutating
    /// the tree or the audit log, and without taking the lock.
    ///
    /// Checksum mismatches become entries in `validation_errors` instead of
    /// failing the call.
    pub async fn preview_update(
        &self,
        changelog: &ChangeLog,
        environment: &str,
        labels: &[String],
        renderer: &dyn DiffRenderer,
    ) -> Result<PreviewReport> {
        let executed = self.audit.list_all().await?;
        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut report = PreviewReport::default();
        let inspector = Inspector::new(self.store.as_ref(), renderer);

        for change_set in &changelog.change_sets {
            if seen_this_run.contains(&change_set.id) {
                report.duplicate_ids.push(change_set.id.clone());
                continue;
            }

            if let Some(record) = executed.get(&change_set.id) {
                let current = checksum(change_set)?;
                if let Err(e) = verify_checksum(change_set, &current, record.checksum.as_deref()) {
                    report.validation_errors.push(e.to_string());
                }
                seen_this_run.insert(change_set.id.clone());
                continue;
            }

            if !should_run(change_set, environment, labels, &changelog.environment_groups) {
                continue;
            }

            let rendered = inspector.inspect(change_set, InspectDirection::Update).await;
            report.pending.push(PreviewEntry {
                id: change_set.id.clone(),
                report: rendered,
            });
            seen_this_run.insert(change_set.id.clone());
        }

        if !report.has_changes() {
            info!("No pending changes found.");
        }
        Ok(report)
    }

    /// Preview what [`MigrationEngine::rollback`] would do. Read-only and
    /// lock-free, like [`MigrationEngine::preview_update`].
    pub async fn preview_rollback(
        &self,
        changelog: &ChangeLog,
        count: usize,
        renderer: &dyn DiffRenderer,
    ) -> Result<PreviewReport> {
        let candidates = self.rollback_candidates(changelog, count).await?;
        let mut report = PreviewReport::default();

        if candidates.is_empty() {
            info!("No executed changesets found to roll back.");
            return Ok(report);
        }

        let inspector = Inspector::new(self.store.as_ref(), renderer);
        for change_set in candidates {
            let rendered = inspector
                .inspect(change_set, InspectDirection::Rollback)
                .await;
            report.pending.push(PreviewEntry {
                id: change_set.id.clone(),
                report: rendered,
            });
        }
        Ok(report)
    }
}

/// Keep configuration errors their own kind; wrap everything else as an
/// apply failure carrying the changeset id.
fn as_apply_failure(id: String, err: MigrationError) -> MigrationError {
    match err {
        MigrationError::Configuration(_) => err,
        other => MigrationError::Apply {
            id,
            source: Box::new(other),
        },
    }
}

/// Validate an already-applied changeset's current checksum against its
/// stored one.
///
/// A record without a checksum (written before tracking existed) passes
/// with a warning. A mismatch passes only when the current checksum appears
/// in the changeset's `valid_checksums` overrides.
fn verify_checksum(change_set: &ChangeSet, current: &str, stored: Option<&str>) -> Result<()> {
    let Some(stored) = stored else {
        warn!(
            "Changeset {} has no stored checksum. Skipping validation.",
            change_set.id
        );
        return Ok(());
    };

    if stored == current {
        return Ok(());
    }
    if change_set
        .valid_checksums
        .iter()
        .any(|valid| valid.eq_ignore_ascii_case(current))
    {
        return Ok(());
    }

    Err(MigrationError::ChecksumMismatch {
        id: change_set.id.clone(),
        stored: stored.to_string(),
        calculated: current.to_string(),
    })
}

/// Eligibility gate: environment match first, then label intersection.
///
/// Environment comparison is case-insensitive and the literal `"All"`
/// matches any execution environment; a changeset environment naming an
/// environment group matches when the group's members (case-sensitive)
/// contain the execution environment. Empty execution labels never run
/// anything.
pub fn should_run(
    change_set: &ChangeSet,
    environment: &str,
    labels: &[String],
    environment_groups: &HashMap<String, Vec<String>>,
) -> bool {
    let mut environment_match = false;
    for env in &change_set.environments {
        if env.eq_ignore_ascii_case("All") || env.eq_ignore_ascii_case(environment) {
            environment_match = true;
            break;
        }
        if let Some(members) = environment_groups.get(env) {
            if members.iter().any(|member| member == environment) {
                environment_match = true;
                break;
            }
        }
    }
    if !environment_match {
        return false;
    }

    if labels.is_empty() {
        return false;
    }
    change_set.labels.iter().any(|label| labels.contains(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn gated(environments: &[&str], cs_labels: &[&str]) -> ChangeSet {
        ChangeSet::new("cs-1", "alice")
            .with_environments(environments.iter().copied())
            .with_labels(cs_labels.iter().copied())
    }

    #[test]
    fn all_wildcard_matches_any_environment() {
        let cs = gated(&["All"], &["app"]);
        assert!(should_run(&cs, "anything", &labels(&["app"]), &HashMap::new()));
    }

    #[test]
    fn environment_match_is_case_insensitive() {
        let cs = gated(&["PROD"], &["app"]);
        assert!(should_run(&cs, "prod", &labels(&["app"]), &HashMap::new()));
    }

    #[test]
    fn environment_mismatch_loses_regardless_of_labels() {
        let cs = gated(&["prod"], &["app"]);
        assert!(!should_run(&cs, "dev", &labels(&["app"]), &HashMap::new()));
    }

    #[test]
    fn empty_execution_labels_never_run() {
        let cs = gated(&["All"], &["app"]);
        assert!(!should_run(&cs, "prod", &[], &HashMap::new()));
    }

    #[test]
    fn label_intersection_is_case_sensitive() {
        let cs = gated(&["All"], &["App"]);
        assert!(!should_run(&cs, "prod", &labels(&["app"]), &HashMap::new()));
        assert!(should_run(&cs, "prod", &labels(&["App", "other"]), &HashMap::new()));
    }

    #[test]
    fn group_membership_matches_execution_environment() {
        let groups: HashMap<String, Vec<String>> =
            [("k8s".to_string(), vec!["dev".to_string(), "staging".to_string()])]
                .into_iter()
                .collect();
        let cs = gated(&["k8s"], &["app"]);
        assert!(should_run(&cs, "dev", &labels(&["app"]), &groups));
        assert!(!should_run(&cs, "prod", &labels(&["app"]), &groups));
    }

    #[test]
    fn group_member_comparison_is_case_sensitive() {
        let groups: HashMap<String, Vec<String>> =
            [("k8s".to_string(), vec!["Dev".to_string()])].into_iter().collect();
        let cs = gated(&["k8s"], &["app"]);
        assert!(!should_run(&cs, "dev", &labels(&["app"]), &groups));
    }

    #[test]
    fn verify_checksum_passes_on_match() {
        let cs = ChangeSet::new("cs-1", "alice");
        assert!(verify_checksum(&cs, "abc", Some("abc")).is_ok());
    }

    #[test]
    fn verify_checksum_passes_without_stored_checksum() {
        let cs = ChangeSet::new("cs-1", "alice");
        assert!(verify_checksum(&cs, "abc", None).is_ok());
    }

    #[test]
    fn verify_checksum_honours_valid_overrides_case_insensitively() {
        let cs = ChangeSet::new("cs-1", "alice").with_valid_checksum("ABC123");
        assert!(verify_checksum(&cs, "abc123", Some("other")).is_ok());
    }

    #[test]
    fn verify_checksum_rejects_unapproved_drift() {
        let cs = ChangeSet::new("cs-1", "alice");
        let err = verify_checksum(&cs, "new", Some("old")).unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { .. }));
    }
}
