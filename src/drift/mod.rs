//! Worktree drift detection
//!
//! Fingerprints the slice of the working tree a unit of work declared
//! (its source paths) using provider status/diff primitives instead of
//! hashing every tracked file, and compares that fingerprint against
//! the one recorded at snapshot time. A provider failure is reported as
//! `Unknown`, never as a clean tree.

use crate::error::TalosResult;
use crate::model::{DriftReport, DriftStatus, TaskContextBundle};
use crate::provider::VersionControlProvider;
use crate::runtime::{hash_content, normalize_text};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Computed fingerprint of the in-scope worktree state
#[derive(Debug, Clone)]
pub struct ScopeFingerprint {
    pub commit: String,
    pub changed_paths: Vec<PathBuf>,
    pub scope_hash: String,
}

/// Detects drift between a bundle's snapshot and the live tree
pub struct DeltaTracker<'a> {
    vcs: &'a dyn VersionControlProvider,
}

impl<'a> DeltaTracker<'a> {
    pub fn new(vcs: &'a dyn VersionControlProvider) -> Self {
        Self { vcs }
    }

    /// Record the current scope hash on a freshly-built bundle
    pub async fn snapshot_worktree(&self, bundle: &mut TaskContextBundle) -> TalosResult<()> {
        let fingerprint = self.fingerprint(&bundle.snapshot.source_paths).await?;
        bundle.scope_hash = Some(fingerprint.scope_hash);
        Ok(())
    }

    /// Compare the stored scope hash against the live tree.
    ///
    /// If the cheap part of the fingerprint (commit + changed path set)
    /// matches the most recent report, that report is reused instead of
    /// recomputing the diff hash. Provider failures produce an
    /// `Unknown` report.
    pub async fn verify_worktree_state(&self, bundle: &TaskContextBundle) -> DriftReport {
        let baseline_commit = bundle.snapshot.source_commit.clone();
        let before = match &bundle.scope_hash {
            Some(hash) => hash.clone(),
            None => {
                warn!(task_id = %bundle.task_id, "no recorded scope hash");
                return unknown_report(&baseline_commit, String::new());
            }
        };

        let commit = match self.vcs.get_current_commit().await {
            Ok(c) => c,
            Err(e) => {
                warn!(task_id = %bundle.task_id, error = %e, "provider failure during drift check");
                return unknown_report(&baseline_commit, before);
            }
        };

        let changed_paths = match self.changed_paths(&bundle.snapshot.source_paths).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(task_id = %bundle.task_id, error = %e, "provider failure during drift check");
                return unknown_report(&baseline_commit, before);
            }
        };

        // Idempotent short-circuit: nothing moved since the last check
        if let Some(last) = bundle.drift_reports.last() {
            if last.status != DriftStatus::Unknown
                && last.current_commit == commit
                && last.changed_paths == changed_paths
            {
                debug!(task_id = %bundle.task_id, "reusing previous drift report");
                return last.clone();
            }
        }

        let after = match self
            .scope_hash(&commit, &changed_paths, &bundle.snapshot.source_paths)
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                warn!(task_id = %bundle.task_id, error = %e, "provider failure during drift check");
                return unknown_report(&baseline_commit, before);
            }
        };

        let status = if before == after {
            DriftStatus::Clean
        } else {
            DriftStatus::Drifted
        };

        DriftReport {
            baseline_commit,
            current_commit: commit,
            changed_paths,
            scope_hash_before: before,
            scope_hash_after: after,
            status,
            checked_at: Utc::now(),
        }
    }

    /// Full fingerprint of the current in-scope state
    pub async fn fingerprint(&self, source_paths: &[PathBuf]) -> TalosResult<ScopeFingerprint> {
        let commit = self.vcs.get_current_commit().await?;
        let changed_paths = self.changed_paths(source_paths).await?;
        let scope_hash = self.scope_hash(&commit, &changed_paths, source_paths).await?;
        Ok(ScopeFingerprint {
            commit,
            changed_paths,
            scope_hash,
        })
    }

    /// Dirty paths from porcelain status, restricted to the scope
    async fn changed_paths(&self, source_paths: &[PathBuf]) -> TalosResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .vcs
            .status()
            .await?
            .into_iter()
            .map(|entry| entry.path)
            .filter(|path| in_scope(path, source_paths))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Hash of commit + normalized uncommitted diff + changed path list.
    ///
    /// The diff text is normalized so incidental whitespace differences
    /// between platforms do not move the fingerprint.
    async fn scope_hash(
        &self,
        commit: &str,
        changed_paths: &[PathBuf],
        source_paths: &[PathBuf],
    ) -> TalosResult<String> {
        let diff = if changed_paths.is_empty() {
            String::new()
        } else {
            normalize_text(&self.vcs.diff_uncommitted(source_paths).await?)
        };

        let mut material = String::with_capacity(diff.len() + 128);
        material.push_str(commit);
        material.push('\n');
        material.push_str(&diff);
        material.push('\n');
        for path in changed_paths {
            material.push_str(&path.to_string_lossy());
            material.push('\n');
        }

        Ok(hash_content(material.as_bytes()))
    }
}

fn in_scope(path: &Path, source_paths: &[PathBuf]) -> bool {
    source_paths.is_empty() || source_paths.iter().any(|scope| path.starts_with(scope))
}

fn unknown_report(baseline_commit: &str, before: String) -> DriftReport {
    DriftReport {
        baseline_commit: baseline_commit.to_string(),
        current_commit: String::new(),
        changed_paths: vec![],
        scope_hash_before: before,
        scope_hash_after: String::new(),
        status: DriftStatus::Unknown,
        checked_at: Utc::now(),
    }
}
