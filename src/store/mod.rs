//! On-disk bundle store
//!
//! One directory per task id under the store root:
//!
//! ```text
//! <root>/bundles/<task_id>/bundle.json
//! <root>/bundles/<task_id>/evidence/...
//! <root>/bundles/<task_id>/qa_baseline.json
//! <root>/exceptions.jsonl
//! <root>/quarantine.json
//! ```
//!
//! All writers go through `runtime::atomic_write` with the bundle's
//! version token; readers never lock and always see a fully-written
//! document.

use crate::error::{TalosError, TalosResult};
use crate::model::{deserialize_bundle, serialize_bundle, TaskContextBundle, SCHEMA_VERSION};
use crate::runtime::atomic_write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Filesystem layout and bundle persistence
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owning everything for one task
    pub fn bundle_dir(&self, task_id: &str) -> PathBuf {
        self.root.join("bundles").join(task_id)
    }

    pub fn bundle_path(&self, task_id: &str) -> PathBuf {
        self.bundle_dir(task_id).join("bundle.json")
    }

    pub fn evidence_dir(&self, task_id: &str) -> PathBuf {
        self.bundle_dir(task_id).join("evidence")
    }

    pub fn qa_baseline_path(&self, task_id: &str) -> PathBuf {
        self.bundle_dir(task_id).join("qa_baseline.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("exceptions.jsonl")
    }

    pub fn quarantine_path(&self) -> PathBuf {
        self.root.join("quarantine.json")
    }

    pub fn exists(&self, task_id: &str) -> bool {
        self.bundle_path(task_id).exists()
    }

    /// Load a bundle, migrating older schema versions in memory.
    ///
    /// Returns the bundle and the schema version it was stored at.
    pub async fn load(&self, task_id: &str) -> TalosResult<(TaskContextBundle, u32)> {
        let path = self.bundle_path(task_id);
        if !path.exists() {
            return Err(TalosError::NotFound(task_id.to_string()));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", path.display()), e))?;

        deserialize_bundle(&content)
    }

    /// Persist a brand-new bundle; fails if one already exists
    pub async fn create(&self, bundle: &TaskContextBundle) -> TalosResult<()> {
        if self.exists(&bundle.task_id) {
            return Err(TalosError::BundleExists(bundle.task_id.clone()));
        }

        let text = serialize_bundle(bundle)?;
        atomic_write(&self.bundle_path(&bundle.task_id), text.as_bytes(), None).await?;
        info!("Created bundle {}", bundle.task_id);
        Ok(())
    }

    /// Persist a mutation of an existing bundle.
    ///
    /// The caller passes the bundle with its token already incremented
    /// and `expected_token` set to the token it read. A concurrent
    /// writer that got there first causes `WriteConflict`.
    pub async fn update(
        &self,
        bundle: &TaskContextBundle,
        expected_token: u64,
    ) -> TalosResult<()> {
        let text = serialize_bundle(bundle)?;
        atomic_write(
            &self.bundle_path(&bundle.task_id),
            text.as_bytes(),
            Some(expected_token),
        )
        .await?;
        debug!(
            "Updated bundle {} (token {} -> {})",
            bundle.task_id, expected_token, bundle.version_token
        );
        Ok(())
    }

    /// All stored task ids, sorted
    pub async fn list(&self) -> TalosResult<Vec<String>> {
        let bundles_dir = self.root.join("bundles");
        if !bundles_dir.exists() {
            return Ok(vec![]);
        }

        let mut ids = vec![];
        let mut entries = fs::read_dir(&bundles_dir)
            .await
            .map_err(|e| TalosError::io("reading bundles directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TalosError::io("reading bundle entry", e))?
        {
            let path = entry.path();
            if path.join("bundle.json").exists() {
                if let Some(name) = path.file_name() {
                    ids.push(name.to_string_lossy().into_owned());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Remove a bundle directory and every artifact it owns
    pub async fn purge(&self, task_id: &str) -> TalosResult<()> {
        let dir = self.bundle_dir(task_id);
        if !dir.exists() {
            return Err(TalosError::NotFound(task_id.to_string()));
        }
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| TalosError::io(format!("purging {}", dir.display()), e))?;
        info!("Purged bundle {}", task_id);
        Ok(())
    }

    /// The schema version newly-created bundles are written at
    pub fn current_schema_version(&self) -> u32 {
        SCHEMA_VERSION
    }
}
