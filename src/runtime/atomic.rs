//! Atomic document writes with optimistic concurrency
//!
//! Writes go to a temp file in the destination directory, then rename
//! into place, so readers never observe a partial document. Concurrency
//! is controlled by a `version_token` field embedded in the persisted
//! JSON: a writer states the token it last read, and the write fails
//! with `WriteConflict` if the on-disk token has moved.

use crate::error::{TalosError, TalosResult};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// Field name carrying the optimistic-concurrency token.
pub const VERSION_TOKEN_FIELD: &str = "version_token";

/// Read the version token from a persisted JSON document.
///
/// Returns `None` if the file does not exist. A document without a
/// token field counts as token 0.
pub async fn read_version_token(path: &Path) -> TalosResult<Option<u64>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| TalosError::io(format!("reading {}", path.display()), e))?;

    let value: Value = serde_json::from_str(&content)?;
    Ok(Some(extract_token(&value)))
}

fn extract_token(value: &Value) -> u64 {
    value
        .get(VERSION_TOKEN_FIELD)
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Atomically write `bytes` to `path`.
///
/// `expected_token` is the version token the caller last read (`None`
/// for a brand-new document). The stored document must still carry that
/// token, otherwise the write fails with `WriteConflict` and nothing is
/// modified. The caller is responsible for embedding the *incremented*
/// token in `bytes`.
pub async fn atomic_write(path: &Path, bytes: &[u8], expected_token: Option<u64>) -> TalosResult<()> {
    let current = read_version_token(path).await?;

    match (current, expected_token) {
        (None, None) => {}
        (Some(found), Some(expected)) if found == expected => {}
        (Some(found), expected) => {
            return Err(TalosError::WriteConflict {
                path: path.to_path_buf(),
                found,
                expected: expected.unwrap_or(0),
            });
        }
        (None, Some(expected)) => {
            // Document vanished since the caller read it
            return Err(TalosError::WriteConflict {
                path: path.to_path_buf(),
                found: 0,
                expected,
            });
        }
    }

    let parent = path
        .parent()
        .ok_or_else(|| TalosError::PathInvalid {
            path: path.to_path_buf(),
            reason: "no parent directory".to_string(),
        })?;

    fs::create_dir_all(parent)
        .await
        .map_err(|e| TalosError::io(format!("creating {}", parent.display()), e))?;

    let tmp = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "doc".to_string()),
        uuid::Uuid::new_v4().simple()
    ));

    fs::write(&tmp, bytes)
        .await
        .map_err(|e| TalosError::io(format!("writing {}", tmp.display()), e))?;

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(TalosError::io(
            format!("renaming {} into place", path.display()),
            e,
        ));
    }

    Ok(())
}
