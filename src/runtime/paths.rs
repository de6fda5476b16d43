//! Path and task-id canonicalization
//!
//! Hashing and lookups must be stable regardless of the form callers
//! supply, so every externally-sourced path or id goes through here.

use crate::error::{TalosError, TalosResult};
use std::path::{Component, Path, PathBuf};

/// Normalize a path without touching the filesystem.
///
/// Collapses `.` components and resolves `..` lexically. Unlike
/// `canonicalize`, the path does not need to exist, which matters for
/// declared source paths that a unit of work has not created yet.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonicalize a caller-supplied task id.
///
/// Ids are uppercased and must be non-empty, contain no path
/// separators or whitespace, and stay within a sane length. A bare
/// numeric id is given the `T-` prefix.
pub fn resolve_task_id(raw: &str) -> TalosResult<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(TalosError::InvalidTaskId("empty id".to_string()));
    }
    if trimmed.len() > 64 {
        return Err(TalosError::InvalidTaskId(format!(
            "{trimmed}: longer than 64 characters"
        )));
    }
    if trimmed
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_whitespace())
    {
        return Err(TalosError::InvalidTaskId(format!(
            "{trimmed}: contains path separators or whitespace"
        )));
    }

    let upper = trimmed.to_uppercase();
    if upper.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("T-{upper}"));
    }

    Ok(upper)
}
