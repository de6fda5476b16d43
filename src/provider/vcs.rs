//! Version-control provider
//!
//! Wraps every git query behind a trait so the drift tracker and
//! snapshot builder never shell out themselves. High-level operations
//! go through the retried `ProcessProvider`; the temporary-index diff
//! is the one sanctioned low-level path, because it must own
//! `GIT_INDEX_FILE`, and whether it also gets the retry wrapper is
//! configurable.

use crate::config::Config;
use crate::error::{TalosError, TalosResult};
use crate::provider::process::{ProcessProvider, ProcessSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

/// One line of porcelain status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Two-character porcelain state code (e.g. ` M`, `??`, `A `)
    pub state: String,
    pub path: PathBuf,
}

/// Abstract version-control interface
#[async_trait]
pub trait VersionControlProvider: Send + Sync {
    /// Working tree status (porcelain entries)
    async fn status(&self) -> TalosResult<Vec<StatusEntry>>;

    /// All tracked files
    async fn ls_files(&self) -> TalosResult<Vec<PathBuf>>;

    /// Unified diff between two refs
    async fn diff(&self, ref_a: &str, ref_b: &str) -> TalosResult<String>;

    /// Diff stat between two refs
    async fn diff_stat(&self, ref_a: &str, ref_b: &str) -> TalosResult<String>;

    /// Merge base of two refs
    async fn resolve_merge_base(&self, ref_a: &str, ref_b: &str) -> TalosResult<String>;

    /// Current HEAD commit hash
    async fn get_current_commit(&self) -> TalosResult<String>;

    /// Current branch name
    async fn get_current_branch(&self) -> TalosResult<String>;

    /// Whether the working tree has any uncommitted change
    async fn check_dirty_tree(&self) -> TalosResult<bool>;

    /// Diff of uncommitted state (staged, unstaged and untracked)
    /// restricted to `paths`, via a temporary index
    async fn diff_uncommitted(&self, paths: &[PathBuf]) -> TalosResult<String>;
}

/// Git-backed provider
pub struct GitProvider {
    repo_root: PathBuf,
    process: ProcessProvider,
    timeout: Duration,
    raw_index_bypass_retry: bool,
}

impl GitProvider {
    /// Discover the repository containing `cwd`
    pub async fn discover(cwd: &Path, config: &Config) -> TalosResult<Self> {
        let process = ProcessProvider::new(config)?;
        let timeout = Duration::from_secs(config.provider.default_timeout_s);

        let spec = ProcessSpec::new("git", &["rev-parse", "--show-toplevel"])
            .with_cwd(cwd)
            .with_timeout(timeout);

        let result = process
            .run(&spec)
            .await
            .map_err(|_| TalosError::NotARepository(cwd.to_path_buf()))?;

        if result.exit_code != Some(0) {
            return Err(TalosError::NotARepository(cwd.to_path_buf()));
        }

        Ok(Self {
            repo_root: PathBuf::from(result.stdout.trim()),
            process,
            timeout,
            raw_index_bypass_retry: config.vcs.raw_index_bypass_retry,
        })
    }

    /// The discovered repository root
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn spec(&self, args: &[&str]) -> ProcessSpec {
        ProcessSpec::new("git", args)
            .with_cwd(&self.repo_root)
            .with_timeout(self.timeout)
    }

    /// Run one wrapped git operation under a named span.
    ///
    /// Span names must be compile-time constants, so the subcommand is
    /// carried in the `operation` field rather than the span name.
    async fn git(&self, op: &'static str, args: &[&str]) -> TalosResult<String> {
        let span = info_span!("provider.vcs", operation = op);
        async {
            let result = self.process.run_checked(&self.spec(args)).await?;
            Ok(result.stdout)
        }
        .instrument(span)
        .await
    }

    /// Run one raw-path git call with a private index file.
    ///
    /// Bypasses the retry wrapper when configured to; the env override
    /// never leaves this module.
    async fn git_raw_index(&self, index_file: &Path, args: &[&str]) -> TalosResult<String> {
        let spec = self
            .spec(args)
            .with_env("GIT_INDEX_FILE", index_file.to_string_lossy());

        if self.raw_index_bypass_retry {
            let result = self.process.run_raw(&spec).await?;
            if result.exit_code != Some(0) {
                return Err(crate::error::ProviderError::NonZeroExitWithStderr {
                    command: spec.display(),
                    stderr: result.stderr.trim().to_string(),
                }
                .into());
            }
            Ok(result.stdout)
        } else {
            Ok(self.process.run_checked(&spec).await?.stdout)
        }
    }

    fn parse_status(output: &str) -> Vec<StatusEntry> {
        output
            .lines()
            .filter(|l| l.len() > 3)
            .map(|line| {
                let state = line[..2].to_string();
                let rest = &line[3..];
                // Renames are reported as "old -> new"; track the new path
                let path = match rest.split_once(" -> ") {
                    Some((_, new)) => new,
                    None => rest,
                };
                StatusEntry {
                    state,
                    path: PathBuf::from(path.trim_matches('"')),
                }
            })
            .collect()
    }
}

#[async_trait]
impl VersionControlProvider for GitProvider {
    async fn status(&self) -> TalosResult<Vec<StatusEntry>> {
        let output = self.git("status", &["status", "--porcelain"]).await?;
        Ok(Self::parse_status(&output))
    }

    async fn ls_files(&self) -> TalosResult<Vec<PathBuf>> {
        let output = self.git("ls_files", &["ls-files", "-z"]).await?;
        Ok(output
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    async fn diff(&self, ref_a: &str, ref_b: &str) -> TalosResult<String> {
        self.git("diff", &["diff", ref_a, ref_b]).await
    }

    async fn diff_stat(&self, ref_a: &str, ref_b: &str) -> TalosResult<String> {
        self.git("diff_stat", &["diff", "--stat", ref_a, ref_b]).await
    }

    async fn resolve_merge_base(&self, ref_a: &str, ref_b: &str) -> TalosResult<String> {
        let output = self
            .git("merge_base", &["merge-base", ref_a, ref_b])
            .await?;
        Ok(output.trim().to_string())
    }

    async fn get_current_commit(&self) -> TalosResult<String> {
        let output = self.git("current_commit", &["rev-parse", "HEAD"]).await?;
        Ok(output.trim().to_string())
    }

    async fn get_current_branch(&self) -> TalosResult<String> {
        let output = self
            .git("current_branch", &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(output.trim().to_string())
    }

    async fn check_dirty_tree(&self) -> TalosResult<bool> {
        Ok(!self.status().await?.is_empty())
    }

    async fn diff_uncommitted(&self, paths: &[PathBuf]) -> TalosResult<String> {
        let index = tempfile::NamedTempFile::new()
            .map_err(|e| TalosError::io("creating temporary index", e))?;
        let index_path = index.path().to_path_buf();

        debug!(index = %index_path.display(), "building temporary index");

        self.git_raw_index(&index_path, &["read-tree", "HEAD"]).await?;

        let mut add_args: Vec<String> =
            vec!["add".to_string(), "-A".to_string(), "--".to_string()];
        let mut diff_args: Vec<String> = vec![
            "diff".to_string(),
            "--cached".to_string(),
            "HEAD".to_string(),
            "--".to_string(),
        ];
        if paths.is_empty() {
            add_args.push(".".to_string());
        } else {
            for p in paths {
                let s = p.to_string_lossy().into_owned();
                add_args.push(s.clone());
                diff_args.push(s);
            }
        }

        let add_refs: Vec<&str> = add_args.iter().map(String::as_str).collect();
        self.git_raw_index(&index_path, &add_refs).await?;

        let diff_refs: Vec<&str> = diff_args.iter().map(String::as_str).collect();
        self.git_raw_index(&index_path, &diff_refs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_modified() {
        let entries = GitProvider::parse_status(" M src/lib.rs\n?? notes.txt\n");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state, " M");
        assert_eq!(entries[0].path, PathBuf::from("src/lib.rs"));
        assert_eq!(entries[1].state, "??");
    }

    #[test]
    fn parse_status_rename_tracks_new_path() {
        let entries = GitProvider::parse_status("R  old.rs -> new.rs\n");
        assert_eq!(entries[0].path, PathBuf::from("new.rs"));
    }

    #[test]
    fn parse_status_empty() {
        assert!(GitProvider::parse_status("").is_empty());
    }
}
