//! Quarantine index
//!
//! Bundles that fail integrity checks (unmigratable schema, corrupt
//! evidence) are quarantined rather than deleted: the payload stays on
//! disk but every read path refuses it until an operator releases it
//! with a justification. The index is one JSON document at the store
//! root, written through the same token-checked atomic path as bundles.

use crate::error::{TalosError, TalosResult};
use crate::model::QuarantineEntry;
use crate::runtime::atomic_write;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct QuarantineDoc {
    version_token: u64,
    #[serde(default)]
    entries: Vec<QuarantineEntry>,
}

/// Store-level index of quarantined bundles
#[derive(Debug, Clone)]
pub struct QuarantineIndex {
    path: PathBuf,
}

impl QuarantineIndex {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> TalosResult<QuarantineDoc> {
        if !self.path.exists() {
            return Ok(QuarantineDoc::default());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", self.path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, doc: &QuarantineDoc, expected_token: Option<u64>) -> TalosResult<()> {
        let text = serde_json::to_string_pretty(doc)?;
        atomic_write(&self.path, text.as_bytes(), expected_token).await
    }

    /// Add a bundle to the quarantine index.
    ///
    /// Quarantining an already-quarantined bundle updates its reason
    /// instead of adding a duplicate entry.
    pub async fn quarantine(
        &self,
        task_id: &str,
        reason: &str,
        release_conditions: &str,
    ) -> TalosResult<QuarantineEntry> {
        let mut doc = self.load().await?;
        let expected = (doc.version_token > 0).then_some(doc.version_token);

        let entry = QuarantineEntry {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
            quarantined_at: Utc::now(),
            release_conditions: release_conditions.to_string(),
        };

        match doc.entries.iter_mut().find(|e| e.task_id == task_id) {
            Some(existing) => {
                warn!(task_id, "bundle already quarantined, updating entry");
                *existing = entry.clone();
            }
            None => doc.entries.push(entry.clone()),
        }

        doc.version_token += 1;
        self.save(&doc, expected).await?;

        warn!(task_id, reason, "bundle quarantined");
        Ok(entry)
    }

    /// Release a bundle from quarantine.
    ///
    /// The justification is required and recorded in the log stream; the
    /// caller is expected to also resolve the ledger exceptions that put
    /// the bundle here.
    pub async fn release(&self, task_id: &str, justification: &str) -> TalosResult<QuarantineEntry> {
        if justification.trim().is_empty() {
            return Err(TalosError::EmptyRequiredField {
                field: "justification".to_string(),
            });
        }

        let mut doc = self.load().await?;
        let expected = (doc.version_token > 0).then_some(doc.version_token);

        let idx = doc
            .entries
            .iter()
            .position(|e| e.task_id == task_id)
            .ok_or_else(|| TalosError::NotFound(task_id.to_string()))?;

        let entry = doc.entries.remove(idx);
        doc.version_token += 1;
        self.save(&doc, expected).await?;

        info!(task_id, justification, "bundle released from quarantine");
        Ok(entry)
    }

    /// The quarantine entry for a task, if any
    pub async fn entry(&self, task_id: &str) -> TalosResult<Option<QuarantineEntry>> {
        let doc = self.load().await?;
        Ok(doc.entries.into_iter().find(|e| e.task_id == task_id))
    }

    pub async fn is_quarantined(&self, task_id: &str) -> TalosResult<bool> {
        Ok(self.entry(task_id).await?.is_some())
    }

    /// Every quarantined bundle, sorted by task id
    pub async fn list(&self) -> TalosResult<Vec<QuarantineEntry>> {
        let mut entries = self.load().await?.entries;
        entries.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn index(dir: &TempDir) -> QuarantineIndex {
        QuarantineIndex::new(dir.path().join("quarantine.json"))
    }

    #[tokio::test]
    async fn quarantine_and_lookup() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index
            .quarantine("T-1", "schema mismatch", "migrate or purge")
            .await
            .unwrap();

        assert!(index.is_quarantined("T-1").await.unwrap());
        assert!(!index.is_quarantined("T-2").await.unwrap());

        let entry = index.entry("T-1").await.unwrap().unwrap();
        assert_eq!(entry.reason, "schema mismatch");
    }

    #[tokio::test]
    async fn release_requires_justification() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index.quarantine("T-1", "corrupt evidence", "reattach").await.unwrap();

        let err = index.release("T-1", "  ").await.unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_REQUIRED_FIELD");

        index.release("T-1", "evidence reattached").await.unwrap();
        assert!(!index.is_quarantined("T-1").await.unwrap());
    }

    #[tokio::test]
    async fn release_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = index(&dir).release("T-404", "why").await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn requarantine_updates_entry() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index.quarantine("T-1", "first", "a").await.unwrap();
        index.quarantine("T-1", "second", "b").await.unwrap();

        let entries = index.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "second");
    }

    #[tokio::test]
    async fn list_sorted() {
        let dir = TempDir::new().unwrap();
        let index = index(&dir);

        index.quarantine("T-2", "r", "c").await.unwrap();
        index.quarantine("T-1", "r", "c").await.unwrap();

        let ids: Vec<String> = index
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.task_id)
            .collect();
        assert_eq!(ids, vec!["T-1", "T-2"]);
    }
}
