//! Error types for Talos
//!
//! All modules use `TalosResult<T>` as their return type.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Talos operations
pub type TalosResult<T> = Result<T, TalosError>;

/// Errors raised by the provider layer.
///
/// Kept as a separate enum so callers can match on external-process
/// failures broadly (`TalosError::Provider`) or narrowly on a variant.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("command failed: {command}, exit code {code}")]
    CommandFailed { command: String, code: i32 },

    #[error("command exited non-zero: {command}, stderr: {stderr}")]
    NonZeroExitWithStderr { command: String, stderr: String },

    #[error("command timed out after {timeout_s}s: {command}")]
    TimeoutExceeded { command: String, timeout_s: u64 },

    #[error("process error: {command}: {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProviderError {
    /// Whether the failure is worth retrying with backoff.
    ///
    /// Timeouts are always transient. Non-zero exits are transient only
    /// when the exit code is in the caller-configured retryable set.
    pub fn is_transient(&self, retryable_exit_codes: &[i32]) -> bool {
        match self {
            Self::TimeoutExceeded { .. } => true,
            Self::CommandFailed { code, .. } => retryable_exit_codes.contains(code),
            _ => false,
        }
    }
}

/// All errors that can occur in Talos
#[derive(Error, Debug)]
pub enum TalosError {
    // Validation errors
    #[error("required field is empty: {field}")]
    EmptyRequiredField { field: String },

    #[error("artifact too large: {size_bytes} bytes exceeds {limit_bytes} byte limit for {kind}")]
    ArtifactTooLarge {
        kind: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("standards reference not found: {reference}: {reason}")]
    StandardsRefInvalid { reference: String, reason: String },

    #[error("invalid validation command {name}: {reason}")]
    ValidationCommandInvalid { name: String, reason: String },

    // Schema errors
    #[error("schema mismatch: stored version {found}, expected {expected}, no migration path")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("migration registry invalid: {0}")]
    MigrationRegistryInvalid(String),

    // Concurrency errors
    #[error("write conflict on {path}: stored token {found}, expected {expected}")]
    WriteConflict {
        path: PathBuf,
        found: u64,
        expected: u64,
    },

    // Lookup errors
    #[error("bundle not found: {0}")]
    NotFound(String),

    #[error("bundle quarantined: {task_id}: {reason}")]
    Quarantined { task_id: String, reason: String },

    #[error("bundle already exists: {0}")]
    BundleExists(String),

    #[error("evidence artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("artifact hash mismatch for {artifact_id}: expected {expected}, got {actual}")]
    ArtifactCorrupt {
        artifact_id: String,
        expected: String,
        actual: String,
    },

    // Provider errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("not inside a version-controlled tree: {0}")]
    NotARepository(PathBuf),

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("invalid redaction pattern `{pattern}`: {reason}")]
    RedactionPatternInvalid { pattern: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable, serializable error surface for external callers.
///
/// The CLI layer renders diagnostics from this without reaching into
/// engine internals.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    pub error_code: &'static str,
    pub message: String,
    pub stage: String,
    pub recoverable: bool,
}

impl TalosError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyRequiredField { .. } => "EMPTY_REQUIRED_FIELD",
            Self::ArtifactTooLarge { .. } => "ARTIFACT_TOO_LARGE",
            Self::InvalidTaskId(_) => "INVALID_TASK_ID",
            Self::StandardsRefInvalid { .. } => "STANDARDS_REF_INVALID",
            Self::ValidationCommandInvalid { .. } => "VALIDATION_COMMAND_INVALID",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::MigrationRegistryInvalid(_) => "MIGRATION_REGISTRY_INVALID",
            Self::WriteConflict { .. } => "WRITE_CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Quarantined { .. } => "QUARANTINED",
            Self::BundleExists(_) => "BUNDLE_EXISTS",
            Self::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            Self::ArtifactCorrupt { .. } => "ARTIFACT_CORRUPT",
            Self::Provider(ProviderError::CommandFailed { .. }) => "COMMAND_FAILED",
            Self::Provider(ProviderError::NonZeroExitWithStderr { .. }) => "NON_ZERO_EXIT",
            Self::Provider(ProviderError::TimeoutExceeded { .. }) => "TIMEOUT_EXCEEDED",
            Self::Provider(ProviderError::Process { .. }) => "PROCESS_ERROR",
            Self::NotARepository(_) => "NOT_A_REPOSITORY",
            Self::ConfigInvalid { .. } => "CONFIG_INVALID",
            Self::RedactionPatternInvalid { .. } => "REDACTION_PATTERN_INVALID",
            Self::Io { .. } => "IO_ERROR",
            Self::PathNotFound(_) => "PATH_NOT_FOUND",
            Self::PathInvalid { .. } => "PATH_INVALID",
            Self::Json(_) => "JSON_ERROR",
            Self::TomlParse(_) => "TOML_PARSE_ERROR",
            Self::TomlSerialize(_) => "TOML_SERIALIZE_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller can reasonably retry after this error
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::WriteConflict { .. }
                | Self::Provider(ProviderError::TimeoutExceeded { .. })
                | Self::Provider(ProviderError::CommandFailed { .. })
        )
    }

    /// Convert to the structured form exposed at the interface boundary
    pub fn to_structured(&self, stage: impl Into<String>) -> StructuredError {
        StructuredError {
            error_code: self.error_code(),
            message: self.to_string(),
            stage: stage.into(),
            recoverable: self.recoverable(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::WriteConflict { .. } => Some("Re-read the bundle and retry the operation"),
            Self::Quarantined { .. } => {
                Some("Run: talos quarantine release <task-id> --justification <why>")
            }
            Self::NotARepository(_) => Some("Run talos from inside a git checkout"),
            Self::SchemaMismatch { .. } => Some("Run: talos migrate <task-id>"),
            _ => None,
        }
    }
}
