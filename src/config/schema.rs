//! Configuration schema for Talos
//!
//! Configuration is stored at `~/.config/talos/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Bundle store settings
    pub store: StoreConfig,

    /// External process provider settings
    pub provider: ProviderConfig,

    /// Version-control provider settings
    pub vcs: VcsConfig,

    /// Secret redaction settings
    pub redaction: RedactionConfig,

    /// Evidence artifact settings
    pub evidence: EvidenceConfig,

    /// QA execution settings
    pub qa: QaConfig,

    /// Exception ledger settings
    pub ledger: LedgerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Bundle store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root override (defaults to the state directory)
    pub root: Option<PathBuf>,
}

/// External process provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Maximum attempts per call (transient failures only)
    pub max_attempts: u32,

    /// Initial backoff between attempts, milliseconds
    pub backoff_initial_ms: u64,

    /// Backoff ceiling, milliseconds
    pub backoff_max_ms: u64,

    /// Default timeout for provider calls, seconds
    pub default_timeout_s: u64,

    /// Exit codes treated as transient and retried
    pub retryable_exit_codes: Vec<i32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_initial_ms: 500,
            backoff_max_ms: 8000,
            default_timeout_s: 60,
            retryable_exit_codes: vec![],
        }
    }
}

/// Version-control provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    /// Whether the temporary-index diff path bypasses the retry wrapper.
    /// The raw path needs direct control of process environment
    /// variables either way; this only decides whether it is retried.
    pub raw_index_bypass_retry: bool,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            raw_index_bypass_retry: true,
        }
    }
}

/// Secret redaction settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Extra patterns as (name, regex) pairs, applied after the defaults
    pub patterns: Vec<(String, String)>,
}

/// Evidence artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Size ceiling for plain files, bytes
    pub max_file_bytes: u64,

    /// Size ceiling for archives (including compressed directories), bytes
    pub max_archive_bytes: u64,

    /// Size ceiling for logs and QA output, bytes
    pub max_log_bytes: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            max_archive_bytes: 100 * 1024 * 1024,
            max_log_bytes: 5 * 1024 * 1024,
        }
    }
}

/// QA execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Hard cap on policy-level reruns, regardless of command policy
    pub max_policy_attempts: u32,

    /// Persist a redacted excerpt of failing output (hashes are always kept)
    pub keep_redacted_excerpt: bool,

    /// Excerpt length cap, characters
    pub excerpt_max_chars: usize,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            max_policy_attempts: 3,
            keep_redacted_excerpt: true,
            excerpt_max_chars: 2000,
        }
    }
}

/// Exception ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Prune resolved entries older than N days (0 = never prune)
    pub retention_days: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { retention_days: 90 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[provider]"));
        assert!(toml.contains("[evidence]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.provider.max_attempts, 3);
        assert!(config.vcs.raw_index_bypass_retry);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [provider]
            max_attempts = 5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.provider.max_attempts, 5);
        assert_eq!(config.provider.backoff_initial_ms, 500); // default preserved
    }
}
