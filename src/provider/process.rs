//! External process execution with retries, telemetry and redaction
//!
//! `run` executes a command with a hard timeout and retries transient
//! failures with exponential backoff. Captured output is returned raw;
//! only what is *recorded* (log events, spans) goes through the
//! redaction engine, so observability never leaks secrets while callers
//! still see the real output.

use crate::config::Config;
use crate::error::{ProviderError, TalosError, TalosResult};
use crate::provider::retry::BackoffPolicy;
use crate::runtime::RedactionEngine;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info_span, warn, Instrument};

/// One external command invocation
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
    /// Capture stdout/stderr (false inherits the parent's streams)
    pub capture: bool,
    /// Redact captured output before it is recorded for observability
    pub redact: bool,
    /// Exit codes counted as success by `run_checked` (empty means `[0]`)
    pub expected_exit_codes: Vec<i32>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: HashMap::new(),
            timeout: Duration::from_secs(60),
            capture: true,
            redact: true,
            expected_exit_codes: vec![],
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Display form for errors and spans
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn accepts(&self, code: i32) -> bool {
        if self.expected_exit_codes.is_empty() {
            code == 0
        } else {
            self.expected_exit_codes.contains(&code)
        }
    }
}

/// Outcome of a completed (spawned and exited) process
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Attempts the wrapper used, including the successful one
    pub attempts: u32,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Sole executor of external commands
pub struct ProcessProvider {
    policy: BackoffPolicy,
    retryable_exit_codes: Vec<i32>,
    redaction: Arc<RedactionEngine>,
}

impl ProcessProvider {
    pub fn new(config: &Config) -> TalosResult<Self> {
        Ok(Self {
            policy: BackoffPolicy::from_config(&config.provider),
            retryable_exit_codes: config.provider.retryable_exit_codes.clone(),
            redaction: Arc::new(RedactionEngine::with_extra_patterns(
                &config.redaction.patterns,
            )?),
        })
    }

    /// Build a provider with explicit parts (tests, facade wiring)
    pub fn with_parts(policy: BackoffPolicy, retryable_exit_codes: Vec<i32>, redaction: Arc<RedactionEngine>) -> Self {
        Self {
            policy,
            retryable_exit_codes,
            redaction,
        }
    }

    /// Run a command, retrying transient failures.
    ///
    /// Returns `Ok` for any process that ran to completion, whatever its
    /// exit code; spawn failures and timeouts are errors. Retries fire
    /// for timeouts and for exit codes configured as retryable.
    pub async fn run(&self, spec: &ProcessSpec) -> TalosResult<ProcessResult> {
        let span = info_span!(
            "provider.process.run",
            command = %spec.display(),
            attempts = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async {
            let mut attempt = 1;
            loop {
                match self.run_once(spec).await {
                    Ok(mut result) => {
                        result.attempts = attempt;
                        let code = result.exit_code.unwrap_or(-1);

                        if result.exit_code != Some(0)
                            && self.retryable_exit_codes.contains(&code)
                            && attempt < self.policy.max_attempts
                        {
                            let delay = self.policy.delay_after(attempt);
                            warn!(
                                exit_code = code,
                                attempt, "retryable exit code, backing off {:?}", delay
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }

                        self.record_outcome(spec, &result);
                        let span = tracing::Span::current();
                        span.record("attempts", attempt);
                        span.record("outcome", if result.success() { "ok" } else { "nonzero" });
                        return Ok(result);
                    }
                    Err(e) => {
                        if e.is_transient(&self.retryable_exit_codes)
                            && attempt < self.policy.max_attempts
                        {
                            let delay = self.policy.delay_after(attempt);
                            warn!(error = %e, attempt, "transient failure, backing off {:?}", delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }

                        let span = tracing::Span::current();
                        span.record("attempts", attempt);
                        span.record("outcome", "error");
                        return Err(TalosError::Provider(e));
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run a command and require an expected exit code.
    ///
    /// Maps unexpected exits to the provider error taxonomy:
    /// `NonZeroExitWithStderr` when stderr has content, `CommandFailed`
    /// otherwise.
    pub async fn run_checked(&self, spec: &ProcessSpec) -> TalosResult<ProcessResult> {
        let result = self.run(spec).await?;
        let code = result.exit_code.unwrap_or(-1);

        if spec.accepts(code) {
            return Ok(result);
        }

        let stderr = result.stderr.trim();
        if stderr.is_empty() {
            Err(ProviderError::CommandFailed {
                command: spec.display(),
                code,
            }
            .into())
        } else {
            Err(ProviderError::NonZeroExitWithStderr {
                command: spec.display(),
                stderr: self.redaction.redact(stderr),
            }
            .into())
        }
    }

    /// Single attempt with no retry wrapper and no span.
    ///
    /// Reserved for the version-control provider's raw index path,
    /// which needs direct control of the process environment.
    pub(crate) async fn run_raw(&self, spec: &ProcessSpec) -> TalosResult<ProcessResult> {
        self.run_once(spec)
            .await
            .map(|mut r| {
                r.attempts = 1;
                r
            })
            .map_err(TalosError::Provider)
    }

    async fn run_once(&self, spec: &ProcessSpec) -> Result<ProcessResult, ProviderError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);

        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            command.env(k, v);
        }
        if spec.capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        command.stdin(Stdio::null());
        command.kill_on_drop(true);

        let started = Instant::now();

        let child = command.spawn().map_err(|e| ProviderError::Process {
            command: spec.display(),
            source: e,
        })?;

        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ProviderError::Process {
                command: spec.display(),
                source: e,
            })?,
            Err(_) => {
                // kill_on_drop terminated the child when the future dropped
                return Err(ProviderError::TimeoutExceeded {
                    command: spec.display(),
                    timeout_s: spec.timeout.as_secs(),
                });
            }
        };

        Ok(ProcessResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
            attempts: 0,
        })
    }

    /// Log a completed run; captured output is redacted before recording
    fn record_outcome(&self, spec: &ProcessSpec, result: &ProcessResult) {
        if !spec.capture {
            debug!(command = %spec.display(), code = ?result.exit_code, "process finished");
            return;
        }

        let stderr_preview: String = result.stderr.chars().take(400).collect();
        let recorded = if spec.redact {
            self.redaction.redact(&stderr_preview)
        } else {
            stderr_preview
        };

        debug!(
            command = %spec.display(),
            code = ?result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            stderr = %recorded,
            "process finished"
        );
    }

    /// The shared redaction engine
    pub fn redaction(&self) -> Arc<RedactionEngine> {
        Arc::clone(&self.redaction)
    }
}
