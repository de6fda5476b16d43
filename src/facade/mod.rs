//! Engine facade
//!
//! Single entry point the CLI (and any embedding caller) drives the
//! engine through. Each operation loads, mutates and persists bundles
//! in one place so the version-token discipline cannot be bypassed, and
//! every operation name is registered up front against the published
//! list instead of scattered through ad hoc dispatch.

mod registry;

pub use registry::{OperationRegistry, PUBLISHED_OPERATIONS};

use crate::config::schema::Config;
use crate::config::ConfigManager;
use crate::drift::DeltaTracker;
use crate::error::{TalosError, TalosResult};
use crate::evidence::{EvidenceManager, EvidenceSource};
use crate::ledger::{ExceptionLedger, QuarantineIndex};
use crate::model::{
    ArtifactKind, DriftReport, EvidenceArtifact, ExceptionRecord, QaResult, QuarantineEntry,
    TaskContextBundle, ValidationCommand, WorkDescriptor, SCHEMA_VERSION,
};
use crate::provider::{GitProvider, ProcessProvider, VersionControlProvider};
use crate::qa::{QaBaseline, QaBaselineManager, QaDriftReport};
use crate::snapshot::SnapshotBuilder;
use crate::store::BundleStore;
use crate::runtime::resolve_task_id;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Store-level summary for `status`
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub store_root: PathBuf,
    pub schema_version: u32,
    pub bundle_count: usize,
    pub quarantined_count: usize,
    pub open_exceptions: usize,
}

/// Composed engine surface
pub struct CacheFacade {
    store: BundleStore,
    vcs: Box<dyn VersionControlProvider>,
    snapshots: SnapshotBuilder,
    evidence: EvidenceManager,
    qa: QaBaselineManager,
    ledger: ExceptionLedger,
    quarantine: QuarantineIndex,
    registry: OperationRegistry,
    ledger_retention_days: u32,
}

impl CacheFacade {
    /// Open the facade against the configured store, discovering the
    /// enclosing repository from `cwd`.
    pub async fn open(config: Config, cwd: &Path) -> TalosResult<Self> {
        let vcs = GitProvider::discover(cwd, &config).await?;
        let docs_root = vcs.repo_root().to_path_buf();
        let store_root = ConfigManager::store_root(&config);
        Self::assemble(config, store_root, Box::new(vcs), docs_root)
    }

    /// Wire the facade from explicit parts (tests, embedding callers)
    pub fn assemble(
        config: Config,
        store_root: PathBuf,
        vcs: Box<dyn VersionControlProvider>,
        docs_root: PathBuf,
    ) -> TalosResult<Self> {
        let store = BundleStore::new(store_root);
        let process = Arc::new(ProcessProvider::new(&config)?);

        Ok(Self {
            evidence: EvidenceManager::new(store.clone(), config.evidence.clone()),
            qa: QaBaselineManager::new(store.clone(), process, config.qa.clone()),
            ledger: ExceptionLedger::new(store.ledger_path()),
            quarantine: QuarantineIndex::new(store.quarantine_path()),
            snapshots: SnapshotBuilder::new(docs_root),
            registry: OperationRegistry::standard()?,
            ledger_retention_days: config.ledger.retention_days,
            store,
            vcs,
        })
    }

    /// Create the immutable context bundle for a new unit of work
    #[instrument(skip(self, descriptor), fields(task_id = %descriptor.task_id))]
    pub async fn init_context(
        &self,
        descriptor: &WorkDescriptor,
    ) -> TalosResult<TaskContextBundle> {
        let op = self.registry.stage("init_context");
        let task_id = resolve_task_id(&descriptor.task_id)?;
        self.guard_quarantine(&task_id, op).await?;

        let mut descriptor = descriptor.clone();
        descriptor.task_id = task_id.clone();

        let snapshot = match self.snapshots.build(&descriptor, self.vcs.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail(op, &task_id, e).await,
        };

        let mut bundle = TaskContextBundle::new(task_id.clone(), snapshot);
        let tracker = DeltaTracker::new(self.vcs.as_ref());
        if let Err(e) = tracker.snapshot_worktree(&mut bundle).await {
            return self.fail(op, &task_id, e).await;
        }

        self.store.create(&bundle).await?;
        info!(task_id = %task_id, "context initialized");
        Ok(bundle)
    }

    /// Load a bundle, refusing quarantined ones.
    ///
    /// Older schema versions are migrated in memory only; persisting the
    /// upgraded form is the explicit `migrate` operation.
    pub async fn get_context(&self, task_id: &str) -> TalosResult<TaskContextBundle> {
        let op = self.registry.stage("get_context");
        let task_id = resolve_task_id(task_id)?;
        self.guard_quarantine(&task_id, op).await?;

        match self.store.load(&task_id).await {
            Ok((bundle, _)) => Ok(bundle),
            Err(e @ TalosError::SchemaMismatch { .. }) => self.fail(op, &task_id, e).await,
            Err(e) => Err(e),
        }
    }

    /// All stored task ids
    pub async fn list_bundles(&self) -> TalosResult<Vec<String>> {
        self.store.list().await
    }

    /// Attach one evidence artifact and persist the enriched bundle
    #[instrument(skip(self, source), fields(kind = %kind))]
    pub async fn attach_evidence(
        &self,
        task_id: &str,
        kind: ArtifactKind,
        source: EvidenceSource<'_>,
    ) -> TalosResult<EvidenceArtifact> {
        let mut bundle = self.get_context(task_id).await?;
        self.attach_to(&mut bundle, kind, source).await
    }

    /// Attach against an already-loaded bundle.
    ///
    /// The payload lands before the token-checked document write; a
    /// rejected write must not leave an orphan payload or an index
    /// entry the document lacks, so the payload is discarded on
    /// conflict and the index is rewritten only after the document.
    async fn attach_to(
        &self,
        bundle: &mut TaskContextBundle,
        kind: ArtifactKind,
        source: EvidenceSource<'_>,
    ) -> TalosResult<EvidenceArtifact> {
        let op = self.registry.stage("attach_evidence");

        let artifact = match self.evidence.attach(bundle, kind, source).await {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(op, &bundle.task_id, e).await,
        };

        if let Err(e) = self.persist(bundle).await {
            self.evidence.discard(&bundle.task_id, &artifact).await;
            return Err(e);
        }

        if let Err(e) = self.evidence.sync_index(bundle).await {
            // The document is authoritative; a stale index is rebuilt
            // by the next successful attach
            warn!(task_id = %bundle.task_id, error = %e, "evidence index not updated");
        }
        Ok(artifact)
    }

    /// Evidence records of a bundle, without re-hashing payloads
    pub async fn list_evidence(&self, task_id: &str) -> TalosResult<Vec<EvidenceArtifact>> {
        let bundle = self.get_context(task_id).await?;
        Ok(self.evidence.list(&bundle).to_vec())
    }

    /// Re-hash one stored artifact and compare against its record
    pub async fn verify_evidence(&self, task_id: &str, artifact_id: &str) -> TalosResult<bool> {
        let op = self.registry.stage("verify_evidence");
        let bundle = self.get_context(task_id).await?;

        let artifact = bundle
            .evidence
            .iter()
            .find(|a| a.artifact_id == artifact_id)
            .ok_or_else(|| TalosError::ArtifactNotFound(artifact_id.to_string()))?;

        let intact = self.evidence.verify(&bundle.task_id, artifact).await?;
        if !intact {
            let err = TalosError::ArtifactCorrupt {
                artifact_id: artifact.artifact_id.clone(),
                expected: artifact.sha256.clone(),
                actual: "payload hash differs".to_string(),
            };
            self.ledger.record_exception(&bundle.task_id, op, &err).await;
        }
        Ok(intact)
    }

    /// Run declared validation commands and persist their results
    #[instrument(skip(self, commands), fields(commands = commands.len()))]
    pub async fn run_validation(
        &self,
        task_id: &str,
        commands: &[ValidationCommand],
    ) -> TalosResult<Vec<QaResult>> {
        let op = self.registry.stage("run_validation");
        let mut bundle = self.get_context(task_id).await?;

        let results = match self.qa.execute_all(&mut bundle, commands).await {
            Ok(results) => results,
            Err(e) => return self.fail(op, &bundle.task_id, e).await,
        };

        self.persist(&mut bundle).await?;
        Ok(results)
    }

    /// Record the bundle's latest QA results as its baseline
    pub async fn set_qa_baseline(&self, task_id: &str) -> TalosResult<QaBaseline> {
        let bundle = self.get_context(task_id).await?;
        self.qa.set_baseline(&bundle).await
    }

    /// Compare latest QA results against the stored baseline
    pub async fn qa_drift(&self, task_id: &str) -> TalosResult<QaDriftReport> {
        let bundle = self.get_context(task_id).await?;
        self.qa.detect_qa_drift(&bundle).await
    }

    /// Check the live tree against the bundle's recorded scope hash.
    ///
    /// The report is appended to the bundle's history and persisted; an
    /// `Unknown` outcome is recorded in the ledger as well.
    #[instrument(skip(self))]
    pub async fn verify_drift(&self, task_id: &str) -> TalosResult<DriftReport> {
        let op = self.registry.stage("verify_drift");
        let mut bundle = self.get_context(task_id).await?;

        let tracker = DeltaTracker::new(self.vcs.as_ref());
        let report = tracker.verify_worktree_state(&bundle).await;

        if report.status == crate::model::DriftStatus::Unknown {
            let err = TalosError::Internal("drift status unknown: working tree unreadable".to_string());
            self.ledger.record_exception(&bundle.task_id, op, &err).await;
        }

        // Identical reports are reused, not re-appended
        let is_new = bundle
            .drift_reports
            .last()
            .map_or(true, |last| last.checked_at != report.checked_at);
        if is_new {
            bundle.drift_reports.push(report.clone());
            self.persist(&mut bundle).await?;
        }

        Ok(report)
    }

    /// Persist a stored bundle at `target` schema version.
    ///
    /// Upgrade steps only run forward, so the current version is the
    /// only supported target. A bundle that cannot be migrated is
    /// quarantined instead of left to fail on every read.
    #[instrument(skip(self))]
    pub async fn migrate(&self, task_id: &str, target: u32) -> TalosResult<u32> {
        let op = self.registry.stage("migrate");
        let task_id = resolve_task_id(task_id)?;

        if target != SCHEMA_VERSION {
            return Err(TalosError::SchemaMismatch {
                found: target,
                expected: SCHEMA_VERSION,
            });
        }

        match self.store.load(&task_id).await {
            Ok((mut bundle, stored_version)) => {
                if stored_version == SCHEMA_VERSION {
                    return Ok(stored_version);
                }
                self.persist(&mut bundle).await?;
                info!(task_id = %task_id, from = stored_version, to = SCHEMA_VERSION, "bundle migrated");
                Ok(stored_version)
            }
            Err(e @ TalosError::SchemaMismatch { .. }) => {
                warn!(task_id = %task_id, error = %e, "unmigratable bundle, quarantining");
                self.quarantine
                    .quarantine(
                        &task_id,
                        &e.to_string(),
                        "restore a readable schema version, then release",
                    )
                    .await?;
                self.fail(op, &task_id, e).await
            }
            Err(e) => Err(e),
        }
    }

    /// Release a quarantined bundle and resolve its ledger exceptions
    pub async fn release_quarantine(
        &self,
        task_id: &str,
        justification: &str,
    ) -> TalosResult<QuarantineEntry> {
        let task_id = resolve_task_id(task_id)?;
        let entry = self.quarantine.release(&task_id, justification).await?;
        self.ledger.mark_resolved(&task_id).await?;

        // Opportunistic maintenance while the ledger is warm
        if self.ledger_retention_days > 0 {
            self.ledger
                .prune_resolved(self.ledger_retention_days)
                .await?;
        }
        Ok(entry)
    }

    /// Every quarantined bundle
    pub async fn quarantined(&self) -> TalosResult<Vec<QuarantineEntry>> {
        self.quarantine.list().await
    }

    /// Exceptions with no resolution event yet
    pub async fn open_exceptions(&self) -> TalosResult<Vec<ExceptionRecord>> {
        self.ledger.unresolved().await
    }

    /// Drop resolved exception histories past the configured window
    pub async fn prune_ledger(&self) -> TalosResult<usize> {
        self.ledger.prune_resolved(self.ledger_retention_days).await
    }

    /// Store-wide summary
    pub async fn status(&self) -> TalosResult<StoreStatus> {
        Ok(StoreStatus {
            store_root: self.store.root().to_path_buf(),
            schema_version: self.store.current_schema_version(),
            bundle_count: self.store.list().await?.len(),
            quarantined_count: self.quarantine.list().await?.len(),
            open_exceptions: self.ledger.unresolved().await?.len(),
        })
    }

    async fn guard_quarantine(&self, task_id: &str, op: &str) -> TalosResult<()> {
        if let Some(entry) = self.quarantine.entry(task_id).await? {
            warn!(task_id, op, "refusing access to quarantined bundle");
            return Err(TalosError::Quarantined {
                task_id: task_id.to_string(),
                reason: entry.reason,
            });
        }
        Ok(())
    }

    /// Bump the token and write through the conflict-checked path
    async fn persist(&self, bundle: &mut TaskContextBundle) -> TalosResult<()> {
        let expected = bundle.version_token;
        bundle.version_token += 1;
        self.store.update(bundle, expected).await
    }

    /// Record the failure in the ledger, then propagate it
    async fn fail<T>(&self, op: &str, task_id: &str, err: TalosError) -> TalosResult<T> {
        self.ledger.record_exception(task_id, op, &err).await;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::model::{DriftStatus, QaStatus, RetryPolicy};
    use crate::provider::StatusEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeVcs {
        commit: Mutex<String>,
        entries: Mutex<Vec<StatusEntry>>,
        diff: Mutex<String>,
        fail: Mutex<bool>,
    }

    impl FakeVcs {
        fn check(&self) -> TalosResult<()> {
            if *self.fail.lock().unwrap() {
                Err(TalosError::Provider(ProviderError::TimeoutExceeded {
                    command: "git status".to_string(),
                    timeout_s: 1,
                }))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl VersionControlProvider for FakeVcs {
        async fn status(&self) -> TalosResult<Vec<StatusEntry>> {
            self.check()?;
            Ok(self.entries.lock().unwrap().clone())
        }
        async fn ls_files(&self) -> TalosResult<Vec<PathBuf>> {
            Ok(vec![])
        }
        async fn diff(&self, _: &str, _: &str) -> TalosResult<String> {
            Ok(String::new())
        }
        async fn diff_stat(&self, _: &str, _: &str) -> TalosResult<String> {
            Ok(String::new())
        }
        async fn resolve_merge_base(&self, _: &str, _: &str) -> TalosResult<String> {
            Ok("base".to_string())
        }
        async fn get_current_commit(&self) -> TalosResult<String> {
            self.check()?;
            Ok(self.commit.lock().unwrap().clone())
        }
        async fn get_current_branch(&self) -> TalosResult<String> {
            Ok("main".to_string())
        }
        async fn check_dirty_tree(&self) -> TalosResult<bool> {
            Ok(!self.entries.lock().unwrap().is_empty())
        }
        async fn diff_uncommitted(&self, _: &[PathBuf]) -> TalosResult<String> {
            self.check()?;
            Ok(self.diff.lock().unwrap().clone())
        }
    }

    fn facade(dir: &TempDir) -> CacheFacade {
        let vcs = FakeVcs::default();
        *vcs.commit.lock().unwrap() = "c0ffee".to_string();

        CacheFacade::assemble(
            Config::default(),
            dir.path().join("store"),
            Box::new(vcs),
            dir.path().to_path_buf(),
        )
        .unwrap()
    }

    fn descriptor(task_id: &str) -> WorkDescriptor {
        WorkDescriptor {
            task_id: task_id.to_string(),
            requirements_text: "Build X".to_string(),
            plan_steps: vec!["step1".to_string()],
            standards_refs: vec!["standards.md#Testing".to_string()],
            source_paths: vec![PathBuf::from("src/x")],
        }
    }

    fn shell_command(name: &str, shell: &str) -> ValidationCommand {
        ValidationCommand {
            name: name.to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), shell.to_string()],
            cwd: None,
            env: HashMap::new(),
            timeout_s: 30,
            retry_policy: RetryPolicy::default(),
            expected_exit_codes: vec![],
            is_blocker: true,
        }
    }

    async fn write_standards(dir: &TempDir) {
        tokio::fs::write(
            dir.path().join("standards.md"),
            "# Standards\n\n## Testing\n\nAll changes carry tests.\n\n## Style\n\nRustfmt.\n",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn init_and_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        let created = facade.init_context(&descriptor("t-1")).await.unwrap();
        assert_eq!(created.task_id, "T-1");
        assert!(created.scope_hash.is_some());

        let loaded = facade.get_context("T-1").await.unwrap();
        assert_eq!(loaded.snapshot, created.snapshot);
        assert_eq!(facade.list_bundles().await.unwrap(), vec!["T-1"]);
    }

    #[tokio::test]
    async fn empty_plan_rejected_and_logged() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        let mut bad = descriptor("T-1");
        bad.plan_steps.clear();

        let err = facade.init_context(&bad).await.unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_REQUIRED_FIELD");

        let open = facade.open_exceptions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stage, "init_context");
    }

    #[tokio::test]
    async fn snapshot_survives_enrichment() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        let created = facade.init_context(&descriptor("T-1")).await.unwrap();

        facade
            .attach_evidence("T-1", ArtifactKind::Log, EvidenceSource::Bytes(b"log line"))
            .await
            .unwrap();
        facade
            .run_validation("T-1", &[shell_command("ok", "exit 0")])
            .await
            .unwrap();

        let loaded = facade.get_context("T-1").await.unwrap();
        assert_eq!(loaded.snapshot, created.snapshot);
        assert_eq!(loaded.evidence.len(), 1);
        assert_eq!(loaded.qa_results.len(), 1);
        // Two persisted mutations after creation
        assert_eq!(loaded.version_token, 3);
    }

    #[tokio::test]
    async fn validation_results_persist() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        let results = facade
            .run_validation("T-1", &[shell_command("run-tests", "exit 0")])
            .await
            .unwrap();
        assert_eq!(results[0].status, QaStatus::Pass);

        facade.set_qa_baseline("T-1").await.unwrap();

        facade
            .run_validation("T-1", &[shell_command("run-tests", "exit 1")])
            .await
            .unwrap();
        let drift = facade.qa_drift("T-1").await.unwrap();
        assert!(drift.has_drift());
    }

    #[tokio::test]
    async fn drift_report_appended() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();

        let report = facade.verify_drift("T-1").await.unwrap();
        assert_eq!(report.status, DriftStatus::Clean);

        let loaded = facade.get_context("T-1").await.unwrap();
        assert_eq!(loaded.drift_reports.len(), 1);
    }

    #[tokio::test]
    async fn conflicting_attach_leaves_no_orphans() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        facade
            .attach_evidence("T-1", ArtifactKind::Log, EvidenceSource::Bytes(b"first"))
            .await
            .unwrap();

        // A stale writer read the bundle before another mutation landed
        let mut stale = facade.get_context("T-1").await.unwrap();
        facade
            .attach_evidence("T-1", ArtifactKind::Log, EvidenceSource::Bytes(b"second"))
            .await
            .unwrap();

        let err = facade
            .attach_to(&mut stale, ArtifactKind::Log, EvidenceSource::Bytes(b"stale"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "WRITE_CONFLICT");

        // Document, index and payload directory all agree: two artifacts
        let bundle = facade.get_context("T-1").await.unwrap();
        assert_eq!(bundle.evidence.len(), 2);

        let evidence_dir = dir.path().join("store/bundles/T-1/evidence");
        let text = tokio::fs::read_to_string(evidence_dir.join("index.json"))
            .await
            .unwrap();
        let indexed: Vec<EvidenceArtifact> = serde_json::from_str(&text).unwrap();
        assert_eq!(indexed.len(), 2);

        let payloads = std::fs::read_dir(&evidence_dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name() != "index.json")
            .count();
        assert_eq!(payloads, 2);
    }

    #[tokio::test]
    async fn corrupt_artifact_logged_under_verification_stage() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        let artifact = facade
            .attach_evidence("T-1", ArtifactKind::Log, EvidenceSource::Bytes(b"original"))
            .await
            .unwrap();

        let payload = dir
            .path()
            .join("store/bundles/T-1/evidence")
            .join(&artifact.path);
        tokio::fs::write(&payload, b"tampered").await.unwrap();

        let intact = facade
            .verify_evidence("T-1", &artifact.artifact_id)
            .await
            .unwrap();
        assert!(!intact);

        let open = facade.open_exceptions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].stage, "verify_evidence");
        assert_eq!(open[0].error_code, "ARTIFACT_CORRUPT");
    }

    #[tokio::test]
    async fn quarantined_bundle_refused() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        facade
            .quarantine
            .quarantine("T-1", "corrupt evidence", "reattach")
            .await
            .unwrap();

        let err = facade.get_context("T-1").await.unwrap_err();
        assert_eq!(err.error_code(), "QUARANTINED");

        let err = facade
            .attach_evidence("T-1", ArtifactKind::Log, EvidenceSource::Bytes(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "QUARANTINED");

        facade
            .release_quarantine("T-1", "evidence reattached")
            .await
            .unwrap();
        assert!(facade.get_context("T-1").await.is_ok());
    }

    #[tokio::test]
    async fn status_summarizes_store() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        facade.init_context(&descriptor("T-2")).await.unwrap();
        facade.quarantine.quarantine("T-2", "r", "c").await.unwrap();

        let status = facade.status().await.unwrap();
        assert_eq!(status.bundle_count, 2);
        assert_eq!(status.quarantined_count, 1);
        assert_eq!(status.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn migrate_current_schema_is_noop() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        let from = facade.migrate("T-1", SCHEMA_VERSION).await.unwrap();
        assert_eq!(from, SCHEMA_VERSION);

        let loaded = facade.get_context("T-1").await.unwrap();
        assert_eq!(loaded.version_token, 1);
    }

    #[tokio::test]
    async fn migrate_rejects_unsupported_target() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();
        let err = facade.migrate("T-1", SCHEMA_VERSION + 1).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        // Target rejection never quarantines the bundle
        assert!(!facade.quarantine.is_quarantined("T-1").await.unwrap());
    }

    #[tokio::test]
    async fn v1_bundle_migrates_and_persists() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        // A bundle written before the version token existed
        let v1 = serde_json::json!({
            "schema_version": 1,
            "bundle": {
                "task_id": "T-7",
                "created_at": "2025-01-15T10:00:00Z",
                "snapshot": {
                    "requirements_text": "Build Y",
                    "plan_steps": ["a"],
                    "standards_excerpts": [],
                    "source_commit": "c0ffee",
                    "source_paths": ["src"]
                }
            }
        });
        let path = dir.path().join("store/bundles/T-7/bundle.json");
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, v1.to_string()).await.unwrap();

        let from = facade.migrate("T-7", SCHEMA_VERSION).await.unwrap();
        assert_eq!(from, 1);

        let (loaded, stored_version) = facade.store.load("T-7").await.unwrap();
        assert_eq!(stored_version, SCHEMA_VERSION);
        assert_eq!(loaded.version_token, 1);

        // Enrichment on the upgraded bundle goes through as well
        facade
            .attach_evidence("T-7", ArtifactKind::Log, EvidenceSource::Bytes(b"log"))
            .await
            .unwrap();
        let loaded = facade.get_context("T-7").await.unwrap();
        assert_eq!(loaded.evidence.len(), 1);
        assert_eq!(loaded.version_token, 2);
    }

    #[tokio::test]
    async fn unmigratable_bundle_quarantined() {
        let dir = TempDir::new().unwrap();
        write_standards(&dir).await;
        let facade = facade(&dir);

        facade.init_context(&descriptor("T-1")).await.unwrap();

        // Corrupt the stored envelope to a future schema version
        let path = dir.path().join("store/bundles/T-1/bundle.json");
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let bumped = text.replace(
            &format!("\"schema_version\": {SCHEMA_VERSION}"),
            &format!("\"schema_version\": {}", SCHEMA_VERSION + 7),
        );
        assert_ne!(text, bumped);
        tokio::fs::write(&path, bumped).await.unwrap();

        let err = facade.migrate("T-1", SCHEMA_VERSION).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(facade.quarantine.is_quarantined("T-1").await.unwrap());
        assert_eq!(facade.open_exceptions().await.unwrap().len(), 1);
    }
}
