//! Exception ledger and quarantine index
//!
//! The ledger is an append-only JSONL file at the store root. Every
//! engine failure worth operator attention lands here as one line;
//! resolution is a second appended line for the same exception, never an
//! in-place edit. Pruning rewrites the file, and is the only operation
//! allowed to drop lines.

pub mod quarantine;

pub use quarantine::QuarantineIndex;

use crate::error::{TalosError, TalosResult};
use crate::model::ExceptionRecord;
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Append-only exception log
#[derive(Debug, Clone)]
pub struct ExceptionLedger {
    path: PathBuf,
}

impl ExceptionLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Record a failure against a task.
    ///
    /// Ledger writes must never mask the error being recorded, so this
    /// only logs its own IO failures instead of propagating them.
    pub async fn record_exception(
        &self,
        task_id: &str,
        stage: &str,
        error: &TalosError,
    ) -> ExceptionRecord {
        let record = ExceptionRecord {
            task_id: task_id.to_string(),
            stage: stage.to_string(),
            error_code: error.error_code().to_string(),
            message: error.to_string(),
            resolved: false,
            recorded_at: Utc::now(),
        };

        if let Err(e) = self.append(&record).await {
            warn!(task_id, stage, error = %e, "failed to append exception record");
        }
        record
    }

    /// Mark every unresolved exception for a task as resolved.
    ///
    /// Resolution is itself an appended event, so the history of the
    /// original failure stays intact. Returns how many exceptions were
    /// resolved.
    pub async fn mark_resolved(&self, task_id: &str) -> TalosResult<usize> {
        let open = self.unresolved().await?;
        let mut count = 0;

        for record in open.into_iter().filter(|r| r.task_id == task_id) {
            let resolution = ExceptionRecord {
                resolved: true,
                recorded_at: Utc::now(),
                ..record
            };
            self.append(&resolution).await?;
            count += 1;
        }

        if count > 0 {
            info!(task_id, count, "exceptions resolved");
        }
        Ok(count)
    }

    /// Every recorded event, oldest first. Corrupt lines are skipped
    /// with a warning rather than failing the whole read.
    pub async fn load_all(&self) -> TalosResult<Vec<ExceptionRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", self.path.display()), e))?;

        let mut records = vec![];
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExceptionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = idx + 1, error = %e, "skipping corrupt ledger line"),
            }
        }
        Ok(records)
    }

    /// Exceptions with no later resolution event.
    ///
    /// Events are keyed by task, stage and error code; the most recent
    /// event for a key decides whether it is still open.
    pub async fn unresolved(&self) -> TalosResult<Vec<ExceptionRecord>> {
        let mut latest: Vec<ExceptionRecord> = vec![];

        for record in self.load_all().await? {
            match latest.iter_mut().find(|r| {
                r.task_id == record.task_id
                    && r.stage == record.stage
                    && r.error_code == record.error_code
            }) {
                Some(existing) => *existing = record,
                None => latest.push(record),
            }
        }

        latest.retain(|r| !r.resolved);
        Ok(latest)
    }

    /// Drop resolved exception histories older than `retention_days`.
    ///
    /// An exception's whole history is kept while it is unresolved or
    /// while its resolution is younger than the cutoff. The rewrite goes
    /// through a temp file so a crash cannot truncate the ledger.
    pub async fn prune_resolved(&self, retention_days: u32) -> TalosResult<usize> {
        let all = self.load_all().await?;
        if all.is_empty() {
            return Ok(0);
        }

        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let unresolved = self.unresolved().await?;

        let keep: Vec<&ExceptionRecord> = all
            .iter()
            .filter(|record| {
                let open = unresolved.iter().any(|u| {
                    u.task_id == record.task_id
                        && u.stage == record.stage
                        && u.error_code == record.error_code
                });
                open || record.recorded_at > cutoff
            })
            .collect();

        let dropped = all.len() - keep.len();
        if dropped == 0 {
            return Ok(0);
        }

        let mut out = String::new();
        for record in &keep {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, out.as_bytes())
            .await
            .map_err(|e| TalosError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| TalosError::io("replacing exception ledger", e))?;

        info!(dropped, "pruned resolved exceptions");
        Ok(dropped)
    }

    async fn append(&self, record: &ExceptionRecord) -> TalosResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TalosError::io(format!("creating {}", parent.display()), e))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| TalosError::io(format!("opening {}", self.path.display()), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| TalosError::io("appending to exception ledger", e))?;
        file.flush()
            .await
            .map_err(|e| TalosError::io("flushing exception ledger", e))?;
        Ok(())
    }
}
