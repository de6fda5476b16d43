//! QA baseline management
//!
//! Executes declared validation commands through the process provider,
//! records hash-only results, and compares result sets against a stored
//! baseline. Raw command output never lands on disk; at most an
//! explicitly redacted excerpt is kept for diagnostics.

use crate::config::schema::QaConfig;
use crate::error::{ProviderError, TalosError, TalosResult};
use crate::model::{QaResult, QaStatus, TaskContextBundle, ValidationCommand};
use crate::provider::{ProcessProvider, ProcessSpec};
use crate::runtime::hash_content;
use crate::store::BundleStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Persisted baseline result set for one bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaBaseline {
    pub recorded_at: DateTime<Utc>,
    pub results: Vec<QaResult>,
}

/// Why one command appears in a QA drift report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaDriftKind {
    /// Pass became fail or fail became pass
    StatusFlip,
    /// The command definition itself changed
    DefinitionChanged,
    /// Baseline has the command but the latest run does not
    MissingResult,
    /// The latest run has a command the baseline never saw
    NewCommand,
}

/// One drifted command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaDriftEntry {
    pub command_ref: String,
    pub kind: QaDriftKind,
    pub baseline_status: Option<QaStatus>,
    pub current_status: Option<QaStatus>,
}

/// QA drift comparison outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaDriftReport {
    pub task_id: String,
    pub entries: Vec<QaDriftEntry>,
    pub checked_at: DateTime<Utc>,
}

impl QaDriftReport {
    pub fn has_drift(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// Executes validation commands and tracks QA drift
pub struct QaBaselineManager {
    store: BundleStore,
    process: Arc<ProcessProvider>,
    config: QaConfig,
}

impl QaBaselineManager {
    pub fn new(store: BundleStore, process: Arc<ProcessProvider>, config: QaConfig) -> Self {
        Self {
            store,
            process,
            config,
        }
    }

    fn validate(command: &ValidationCommand) -> TalosResult<()> {
        let invalid = |reason: &str| TalosError::ValidationCommandInvalid {
            name: command.name.clone(),
            reason: reason.to_string(),
        };
        if command.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if command.command.is_empty() {
            return Err(invalid("command line is empty"));
        }
        if command.timeout_s == 0 {
            return Err(invalid("timeout_s must be positive"));
        }
        if command.retry_policy.max_attempts == 0 {
            return Err(invalid("retry_policy.max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Execute one validation command, applying its policy-level rerun
    /// cap (distinct from the provider's transient-failure retry).
    pub async fn execute_validation_command(
        &self,
        command: &ValidationCommand,
    ) -> TalosResult<QaResult> {
        Self::validate(command)?;

        let attempts = command
            .retry_policy
            .max_attempts
            .min(self.config.max_policy_attempts)
            .max(1);

        let mut result = self.run_once(command).await?;
        let mut attempt = 1;
        while result.status != QaStatus::Pass && attempt < attempts {
            warn!(
                command = %command.name,
                status = %result.status,
                attempt,
                "validation command did not pass, rerunning"
            );
            attempt += 1;
            result = self.run_once(command).await?;
        }

        Ok(result)
    }

    async fn run_once(&self, command: &ValidationCommand) -> TalosResult<QaResult> {
        let mut spec = ProcessSpec::new(
            command.command[0].clone(),
            &command.command[1..]
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>(),
        )
        .with_timeout(Duration::from_secs(command.timeout_s));
        if let Some(ref cwd) = command.cwd {
            spec.cwd = Some(cwd.clone());
        }
        spec.env = command.env.clone();
        spec.expected_exit_codes = command.expected_exit_codes.clone();

        let started = Utc::now();
        match self.process.run(&spec).await {
            Ok(result) => {
                let code = result.exit_code.unwrap_or(-1);
                let status = if command.accepts_exit_code(code) {
                    QaStatus::Pass
                } else {
                    QaStatus::Fail
                };

                let excerpt = if status != QaStatus::Pass && self.config.keep_redacted_excerpt {
                    Some(self.excerpt(&result.stderr, &result.stdout))
                } else {
                    None
                };

                Ok(QaResult {
                    command_ref: command.name.clone(),
                    command_hash: command.definition_hash(),
                    exit_code: result.exit_code,
                    stdout_hash: hash_content(result.stdout.as_bytes()),
                    stderr_hash: hash_content(result.stderr.as_bytes()),
                    duration_ms: result.duration.as_millis() as u64,
                    status,
                    redacted_excerpt: excerpt,
                    recorded_at: started,
                })
            }
            Err(TalosError::Provider(ProviderError::TimeoutExceeded { timeout_s, .. })) => {
                Ok(QaResult {
                    command_ref: command.name.clone(),
                    command_hash: command.definition_hash(),
                    exit_code: None,
                    stdout_hash: hash_content(b""),
                    stderr_hash: hash_content(b""),
                    duration_ms: timeout_s * 1000,
                    status: QaStatus::Timeout,
                    redacted_excerpt: None,
                    recorded_at: started,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Redacted, bounded excerpt of failing output
    fn excerpt(&self, stderr: &str, stdout: &str) -> String {
        let raw = if stderr.trim().is_empty() { stdout } else { stderr };
        let redacted = self.process.redaction().redact(raw);
        redacted.chars().take(self.config.excerpt_max_chars).collect()
    }

    /// Execute a command list in order, appending results to the bundle.
    ///
    /// Once a blocker has failed, remaining non-blockers are recorded
    /// as `skipped` instead of executed.
    pub async fn execute_all(
        &self,
        bundle: &mut TaskContextBundle,
        commands: &[ValidationCommand],
    ) -> TalosResult<Vec<QaResult>> {
        let mut results = Vec::with_capacity(commands.len());
        let mut blocker_failed = false;

        for command in commands {
            Self::validate(command)?;

            let result = if blocker_failed && !command.is_blocker {
                info!(command = %command.name, "skipping after blocker failure");
                QaResult {
                    command_ref: command.name.clone(),
                    command_hash: command.definition_hash(),
                    exit_code: None,
                    stdout_hash: hash_content(b""),
                    stderr_hash: hash_content(b""),
                    duration_ms: 0,
                    status: QaStatus::Skipped,
                    redacted_excerpt: None,
                    recorded_at: Utc::now(),
                }
            } else {
                self.execute_validation_command(command).await?
            };

            if command.is_blocker && result.status != QaStatus::Pass {
                blocker_failed = true;
            }

            bundle.qa_results.push(result.clone());
            results.push(result);
        }

        Ok(results)
    }

    /// Persist the bundle's latest results as the comparison baseline
    pub async fn set_baseline(&self, bundle: &TaskContextBundle) -> TalosResult<QaBaseline> {
        let latest = bundle.latest_qa_results();
        let mut results: Vec<QaResult> = latest.values().map(|r| (*r).clone()).collect();
        results.sort_by(|a, b| a.command_ref.cmp(&b.command_ref));

        let baseline = QaBaseline {
            recorded_at: Utc::now(),
            results,
        };

        let path = self.store.qa_baseline_path(&bundle.task_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TalosError::io("creating bundle directory", e))?;
        }
        let text = serde_json::to_string_pretty(&baseline)?;
        fs::write(&path, text)
            .await
            .map_err(|e| TalosError::io("writing QA baseline", e))?;

        info!(task_id = %bundle.task_id, "QA baseline recorded");
        Ok(baseline)
    }

    /// Load the stored baseline, if one was ever recorded
    pub async fn load_baseline(&self, task_id: &str) -> TalosResult<Option<QaBaseline>> {
        let path = self.store.qa_baseline_path(task_id);
        if !path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&path)
            .await
            .map_err(|e| TalosError::io("reading QA baseline", e))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Compare the bundle's most recent results against the baseline.
    ///
    /// Drift is a pass/fail flip, a changed command definition, or a
    /// command present on only one side. Skipped runs do not flip.
    pub async fn detect_qa_drift(&self, bundle: &TaskContextBundle) -> TalosResult<QaDriftReport> {
        let baseline = self.load_baseline(&bundle.task_id).await?;
        let latest = bundle.latest_qa_results();

        let mut entries = Vec::new();

        if let Some(baseline) = &baseline {
            for base in &baseline.results {
                match latest.get(base.command_ref.as_str()) {
                    None => entries.push(QaDriftEntry {
                        command_ref: base.command_ref.clone(),
                        kind: QaDriftKind::MissingResult,
                        baseline_status: Some(base.status),
                        current_status: None,
                    }),
                    Some(current) => {
                        if current.command_hash != base.command_hash {
                            entries.push(QaDriftEntry {
                                command_ref: base.command_ref.clone(),
                                kind: QaDriftKind::DefinitionChanged,
                                baseline_status: Some(base.status),
                                current_status: Some(current.status),
                            });
                        } else if current.status != QaStatus::Skipped
                            && current.status != base.status
                        {
                            entries.push(QaDriftEntry {
                                command_ref: base.command_ref.clone(),
                                kind: QaDriftKind::StatusFlip,
                                baseline_status: Some(base.status),
                                current_status: Some(current.status),
                            });
                        }
                    }
                }
            }

            for (name, current) in &latest {
                if !baseline.results.iter().any(|b| b.command_ref == *name) {
                    entries.push(QaDriftEntry {
                        command_ref: (*name).to_string(),
                        kind: QaDriftKind::NewCommand,
                        baseline_status: None,
                        current_status: Some(current.status),
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.command_ref.cmp(&b.command_ref));

        Ok(QaDriftReport {
            task_id: bundle.task_id.clone(),
            entries,
            checked_at: Utc::now(),
        })
    }
}

/// Render a QA drift report as stable, secret-free text.
///
/// Field order is fixed so downstream diffing of the rendering itself
/// is meaningful.
pub fn format_drift_report(report: &QaDriftReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("QA drift report for {}\n", report.task_id));

    if report.entries.is_empty() {
        out.push_str("no drift detected\n");
        return out;
    }

    for entry in &report.entries {
        let baseline = entry
            .baseline_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let current = entry
            .current_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let kind = match entry.kind {
            QaDriftKind::StatusFlip => "status_flip",
            QaDriftKind::DefinitionChanged => "definition_changed",
            QaDriftKind::MissingResult => "missing_result",
            QaDriftKind::NewCommand => "new_command",
        };
        out.push_str(&format!(
            "{}: {} baseline={} current={}\n",
            entry.command_ref, kind, baseline, current
        ));
    }
    out
}
