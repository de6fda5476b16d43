//! Persisted entities for the task context cache

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Unit-of-work descriptor supplied by the scheduler/CLI layer.
///
/// Input contract only; the engine never persists this directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub task_id: String,
    pub requirements_text: String,
    pub plan_steps: Vec<String>,
    /// Standards citations in `path#heading` form
    pub standards_refs: Vec<String>,
    /// Paths whose state the drift tracker fingerprints
    pub source_paths: Vec<PathBuf>,
}

/// One extracted standards section, hashed for drift detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardsExcerpt {
    pub path: PathBuf,
    pub heading: String,
    pub content_hash: String,
}

/// Point-in-time capture of requirements, plan and standards.
///
/// Never mutated after construction; enrichment attaches sibling
/// records to the owning bundle instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableSnapshot {
    pub requirements_text: String,
    pub plan_steps: Vec<String>,
    pub standards_excerpts: Vec<StandardsExcerpt>,
    /// Commit the snapshot was taken at
    pub source_commit: String,
    /// Declared source paths, normalized
    pub source_paths: Vec<PathBuf>,
}

/// Artifact type, each with its own size ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    File,
    Directory,
    Archive,
    Log,
    QaOutput,
}

impl ArtifactKind {
    /// Parse from CLI-supplied text
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "directory" => Some(Self::Directory),
            "archive" => Some(Self::Archive),
            "log" => Some(Self::Log),
            "qa_output" | "qa-output" => Some(Self::QaOutput),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Archive => "archive",
            Self::Log => "log",
            Self::QaOutput => "qa_output",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attached piece of proof
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    pub artifact_id: String,
    pub kind: ArtifactKind,
    /// Path of the stored payload, relative to the bundle's evidence dir
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Policy-level retry cap for a validation command.
///
/// Distinct from the provider's transient-failure retry: this caps
/// whole reruns of a flaky command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

/// A declared command the QA baseline manager may run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationCommand {
    /// Short name callers reference results by
    pub name: String,
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub timeout_s: u64,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Exit codes counted as success (empty means `[0]`)
    #[serde(default)]
    pub expected_exit_codes: Vec<i32>,
    /// Blocker failures halt the remaining command list
    #[serde(default)]
    pub is_blocker: bool,
}

impl ValidationCommand {
    /// Whether `code` counts as success for this command
    pub fn accepts_exit_code(&self, code: i32) -> bool {
        if self.expected_exit_codes.is_empty() {
            code == 0
        } else {
            self.expected_exit_codes.contains(&code)
        }
    }

    /// Hash of the command definition, used to detect redefinitions
    pub fn definition_hash(&self) -> String {
        let mut env: Vec<(&String, &String)> = self.env.iter().collect();
        env.sort();
        let repr = format!(
            "{}|{:?}|{:?}|{:?}|{}|{:?}|{}",
            self.name,
            self.command,
            self.cwd,
            env,
            self.timeout_s,
            self.expected_exit_codes,
            self.is_blocker
        );
        crate::runtime::hash_content(repr.as_bytes())
    }
}

/// Outcome classification for a QA run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaStatus {
    Pass,
    Fail,
    Timeout,
    Skipped,
}

impl std::fmt::Display for QaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Stored outcome of one validation command execution.
///
/// Only output hashes are stored; raw output never lands on disk. An
/// explicitly redacted excerpt may be kept alongside for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResult {
    /// `ValidationCommand::name` this result belongs to
    pub command_ref: String,
    /// Hash of the command definition at execution time
    pub command_hash: String,
    pub exit_code: Option<i32>,
    pub stdout_hash: String,
    pub stderr_hash: String,
    pub duration_ms: u64,
    pub status: QaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redacted_excerpt: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Drift comparison outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    Clean,
    Drifted,
    /// Working tree unreadable or provider failure; treated as blocking
    Unknown,
}

impl DriftStatus {
    /// Both drift and an unreadable tree block downstream work
    pub fn is_blocking(&self) -> bool {
        !matches!(self, Self::Clean)
    }
}

/// Result of comparing a snapshot fingerprint to the live tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub baseline_commit: String,
    pub current_commit: String,
    pub changed_paths: Vec<PathBuf>,
    pub scope_hash_before: String,
    pub scope_hash_after: String,
    pub status: DriftStatus,
    pub checked_at: DateTime<Utc>,
}

impl DriftReport {
    /// `true` iff the scope hashes differ
    pub fn drifted(&self) -> bool {
        self.scope_hash_before != self.scope_hash_after
    }
}

/// The full cached state for one unit of work.
///
/// The bundle exclusively owns its snapshot, evidence list and QA
/// results; ledger records reference it by `task_id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContextBundle {
    pub task_id: String,
    /// Optimistic-concurrency token, incremented on every persisted write
    pub version_token: u64,
    pub created_at: DateTime<Utc>,
    pub snapshot: ImmutableSnapshot,
    #[serde(default)]
    pub evidence: Vec<EvidenceArtifact>,
    #[serde(default)]
    pub qa_results: Vec<QaResult>,
    #[serde(default)]
    pub drift_reports: Vec<DriftReport>,
    /// Recorded scope hash for drift verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_hash: Option<String>,
}

impl TaskContextBundle {
    /// Create a fresh bundle around an immutable snapshot
    pub fn new(task_id: String, snapshot: ImmutableSnapshot) -> Self {
        Self {
            task_id,
            version_token: 1,
            created_at: Utc::now(),
            snapshot,
            evidence: vec![],
            qa_results: vec![],
            drift_reports: vec![],
            scope_hash: None,
        }
    }

    /// Most recent QA result per command name, preserving append order
    pub fn latest_qa_results(&self) -> HashMap<&str, &QaResult> {
        let mut latest = HashMap::new();
        for result in &self.qa_results {
            latest.insert(result.command_ref.as_str(), result);
        }
        latest
    }
}

/// A logged failure tied to a bundle, referenced by id only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub task_id: String,
    pub stage: String,
    pub error_code: String,
    pub message: String,
    pub resolved: bool,
    pub recorded_at: DateTime<Utc>,
}

/// A bundle excluded from active use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub task_id: String,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
    /// What must be true before release, for the operator
    pub release_conditions: String,
}
