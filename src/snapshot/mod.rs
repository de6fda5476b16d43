//! Immutable snapshot construction
//!
//! Builds the point-in-time portion of a bundle exactly once, at
//! creation. Lists are validated non-empty up front so a partially
//! populated bundle can never be persisted, and standards excerpts are
//! extracted, normalized and hashed with a memo keyed by the source
//! document's own hash.

use crate::error::{TalosError, TalosResult};
use crate::model::{ImmutableSnapshot, StandardsExcerpt, WorkDescriptor};
use crate::provider::VersionControlProvider;
use crate::runtime::{hash_content, hash_text, normalize_path, normalize_text};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Builds `ImmutableSnapshot`s, memoizing excerpt extraction
pub struct SnapshotBuilder {
    /// Directory standards references are resolved against
    docs_root: PathBuf,
    /// (document hash, heading) -> extracted content hash
    excerpt_memo: Mutex<HashMap<(String, String), String>>,
}

impl SnapshotBuilder {
    pub fn new(docs_root: PathBuf) -> Self {
        Self {
            docs_root,
            excerpt_memo: Mutex::new(HashMap::new()),
        }
    }

    /// Build the snapshot for a unit of work.
    ///
    /// Fails with `EmptyRequiredField` before touching the provider if
    /// any required field is empty.
    pub async fn build(
        &self,
        descriptor: &WorkDescriptor,
        vcs: &dyn VersionControlProvider,
    ) -> TalosResult<ImmutableSnapshot> {
        validate_descriptor(descriptor)?;

        let source_commit = vcs.get_current_commit().await?;

        let mut excerpts = Vec::with_capacity(descriptor.standards_refs.len());
        for reference in &descriptor.standards_refs {
            excerpts.push(self.extract_excerpt(reference).await?);
        }

        Ok(ImmutableSnapshot {
            requirements_text: normalize_text(&descriptor.requirements_text),
            plan_steps: descriptor.plan_steps.clone(),
            standards_excerpts: excerpts,
            source_commit,
            source_paths: descriptor
                .source_paths
                .iter()
                .map(|p| normalize_path(p))
                .collect(),
        })
    }

    /// Extract and hash one `path#heading` standards reference.
    ///
    /// Repeated builds against an unchanged document short-circuit on
    /// the memo; a changed document hash invalidates the entry.
    async fn extract_excerpt(&self, reference: &str) -> TalosResult<StandardsExcerpt> {
        let (path_part, heading) =
            reference
                .split_once('#')
                .ok_or_else(|| TalosError::StandardsRefInvalid {
                    reference: reference.to_string(),
                    reason: "expected `path#heading`".to_string(),
                })?;

        let path = normalize_path(&self.docs_root.join(path_part));
        if !path.exists() {
            return Err(TalosError::StandardsRefInvalid {
                reference: reference.to_string(),
                reason: format!("document not found: {}", path.display()),
            });
        }

        let document = fs::read_to_string(&path)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", path.display()), e))?;
        let document_hash = hash_content(document.as_bytes());

        let memo_key = (document_hash, heading.to_string());
        if let Some(hash) = self.excerpt_memo.lock().unwrap().get(&memo_key) {
            debug!(reference, "excerpt memo hit");
            return Ok(StandardsExcerpt {
                path: PathBuf::from(path_part),
                heading: heading.to_string(),
                content_hash: hash.clone(),
            });
        }

        let section =
            extract_section(&document, heading).ok_or_else(|| TalosError::StandardsRefInvalid {
                reference: reference.to_string(),
                reason: format!("heading not found: {heading}"),
            })?;

        let content_hash = hash_text(&section);
        self.excerpt_memo
            .lock()
            .unwrap()
            .insert(memo_key, content_hash.clone());

        Ok(StandardsExcerpt {
            path: PathBuf::from(path_part),
            heading: heading.to_string(),
            content_hash,
        })
    }
}

/// Reject empty required fields with the field name in the error
fn validate_descriptor(descriptor: &WorkDescriptor) -> TalosResult<()> {
    let empty = |field: &str| TalosError::EmptyRequiredField {
        field: field.to_string(),
    };

    if descriptor.requirements_text.trim().is_empty() {
        return Err(empty("requirements_text"));
    }
    if descriptor.plan_steps.is_empty() {
        return Err(empty("plan_steps"));
    }
    if descriptor.standards_refs.is_empty() {
        return Err(empty("standards_refs"));
    }
    if descriptor.source_paths.is_empty() {
        return Err(empty("source_paths"));
    }
    Ok(())
}

/// Pull the body of a markdown section by heading text.
///
/// Matches any `#`-level heading whose text equals `heading`
/// (case-insensitive); the section runs until the next heading of the
/// same or shallower depth.
fn extract_section(document: &str, heading: &str) -> Option<String> {
    let mut lines = document.lines();
    let mut depth = 0;

    // Find the heading line
    loop {
        let line = lines.next()?;
        if let Some((level, text)) = parse_heading(line) {
            if text.eq_ignore_ascii_case(heading.trim()) {
                depth = level;
                break;
            }
        }
    }

    let mut body = Vec::new();
    for line in lines {
        if let Some((level, _)) = parse_heading(line) {
            if level <= depth {
                break;
            }
        }
        body.push(line);
    }

    Some(body.join("\n"))
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = trimmed[hashes..].trim();
    if rest.is_empty() {
        return None;
    }
    Some((hashes, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TalosResult;
    use crate::provider::StatusEntry;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FakeVcs;

    #[async_trait]
    impl VersionControlProvider for FakeVcs {
        async fn status(&self) -> TalosResult<Vec<StatusEntry>> {
            Ok(vec![])
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
            Ok("c0ffee".to_string())
        }
        async fn get_current_branch(&self) -> TalosResult<String> {
            Ok("main".to_string())
        }
        async fn check_dirty_tree(&self) -> TalosResult<bool> {
            Ok(false)
        }
        async fn diff_uncommitted(&self, _: &[PathBuf]) -> TalosResult<String> {
            Ok(String::new())
        }
    }

    const STANDARDS: &str = "\
# Standards

intro text

## Testing

All changes carry tests.

Coverage is reviewed.

## Style

Four-space indent.
";

    fn descriptor() -> WorkDescriptor {
        WorkDescriptor {
            task_id: "T-1".to_string(),
            requirements_text: "Build X".to_string(),
            plan_steps: vec!["step1".to_string(), "step2".to_string()],
            standards_refs: vec!["standards.md#Testing".to_string()],
            source_paths: vec![PathBuf::from("src/x")],
        }
    }

    async fn builder_with_doc() -> (TempDir, SnapshotBuilder) {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("standards.md"), STANDARDS)
            .await
            .unwrap();
        let builder = SnapshotBuilder::new(dir.path().to_path_buf());
        (dir, builder)
    }

    #[tokio::test]
    async fn builds_full_snapshot() {
        let (_dir, builder) = builder_with_doc().await;
        let snapshot = builder.build(&descriptor(), &FakeVcs).await.unwrap();

        assert_eq!(snapshot.source_commit, "c0ffee");
        assert_eq!(snapshot.plan_steps, vec!["step1", "step2"]);
        assert_eq!(snapshot.standards_excerpts.len(), 1);
        assert_eq!(snapshot.standards_excerpts[0].heading, "Testing");
        assert_eq!(snapshot.standards_excerpts[0].content_hash.len(), 64);
    }

    #[tokio::test]
    async fn empty_plan_rejected() {
        let (_dir, builder) = builder_with_doc().await;
        let mut desc = descriptor();
        desc.plan_steps.clear();

        let err = builder.build(&desc, &FakeVcs).await.unwrap_err();
        match err {
            TalosError::EmptyRequiredField { field } => assert_eq!(field, "plan_steps"),
            other => panic!("expected EmptyRequiredField, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_requirements_rejected() {
        let (_dir, builder) = builder_with_doc().await;
        let mut desc = descriptor();
        desc.requirements_text = "   ".to_string();

        assert!(builder.build(&desc, &FakeVcs).await.is_err());
    }

    #[tokio::test]
    async fn missing_heading_rejected() {
        let (_dir, builder) = builder_with_doc().await;
        let mut desc = descriptor();
        desc.standards_refs = vec!["standards.md#Nope".to_string()];

        let err = builder.build(&desc, &FakeVcs).await.unwrap_err();
        assert_eq!(err.error_code(), "STANDARDS_REF_INVALID");
    }

    #[tokio::test]
    async fn extraction_is_deterministic() {
        let (_dir, builder) = builder_with_doc().await;
        let a = builder.build(&descriptor(), &FakeVcs).await.unwrap();
        let b = builder.build(&descriptor(), &FakeVcs).await.unwrap();
        assert_eq!(
            a.standards_excerpts[0].content_hash,
            b.standards_excerpts[0].content_hash
        );
    }

    #[tokio::test]
    async fn memo_invalidated_when_document_changes() {
        let (dir, builder) = builder_with_doc().await;
        let first = builder.build(&descriptor(), &FakeVcs).await.unwrap();

        let changed = STANDARDS.replace("All changes carry tests.", "All changes carry two tests.");
        tokio::fs::write(dir.path().join("standards.md"), changed)
            .await
            .unwrap();

        let second = builder.build(&descriptor(), &FakeVcs).await.unwrap();
        assert_ne!(
            first.standards_excerpts[0].content_hash,
            second.standards_excerpts[0].content_hash
        );
    }

    #[test]
    fn section_extraction_stops_at_sibling() {
        let section = extract_section(STANDARDS, "Testing").unwrap();
        assert!(section.contains("All changes carry tests."));
        assert!(!section.contains("Four-space indent."));
    }

    #[test]
    fn section_extraction_case_insensitive() {
        assert!(extract_section(STANDARDS, "testing").is_some());
    }
}
