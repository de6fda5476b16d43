//! Evidence artifact management
//!
//! Attaches typed proof artifacts to a bundle: size ceilings are
//! enforced per kind before anything lands on disk, payloads are
//! content-hashed on attach and re-verified on demand, and directory
//! evidence is compressed into a single `.tar.gz` archive. Payloads
//! live only under the owning bundle's evidence directory.

mod archive;

pub use archive::{archive_directory, directory_size};

use crate::config::schema::EvidenceConfig;
use crate::error::{TalosError, TalosResult};
use crate::model::{ArtifactKind, EvidenceArtifact, TaskContextBundle};
use crate::runtime::hash_content;
use crate::store::BundleStore;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payload source for an attach call
pub enum EvidenceSource<'a> {
    /// In-memory payload (logs, QA output)
    Bytes(&'a [u8]),
    /// File or directory on disk
    Path(&'a Path),
}

/// Attaches, lists and verifies evidence artifacts
pub struct EvidenceManager {
    store: BundleStore,
    limits: EvidenceConfig,
}

impl EvidenceManager {
    pub fn new(store: BundleStore, limits: EvidenceConfig) -> Self {
        Self { store, limits }
    }

    /// Size ceiling for one artifact kind
    fn limit_for(&self, kind: ArtifactKind) -> u64 {
        match kind {
            ArtifactKind::File => self.limits.max_file_bytes,
            ArtifactKind::Directory | ArtifactKind::Archive => self.limits.max_archive_bytes,
            ArtifactKind::Log | ArtifactKind::QaOutput => self.limits.max_log_bytes,
        }
    }

    /// Attach one artifact to a bundle.
    ///
    /// Writes the payload and appends the artifact record to
    /// `bundle.evidence`; persisting the bundle and syncing the index
    /// remain the caller's (facade's) responsibility so the
    /// version-token write stays in one place. A caller whose bundle
    /// write fails must `discard` the payload. Oversized payloads are
    /// rejected before anything is written.
    pub async fn attach(
        &self,
        bundle: &mut TaskContextBundle,
        kind: ArtifactKind,
        source: EvidenceSource<'_>,
    ) -> TalosResult<EvidenceArtifact> {
        let artifact_id = Uuid::new_v4().to_string();
        let evidence_dir = self.store.evidence_dir(&bundle.task_id);
        fs::create_dir_all(&evidence_dir)
            .await
            .map_err(|e| TalosError::io(format!("creating {}", evidence_dir.display()), e))?;

        let limit = self.limit_for(kind);

        let (file_name, size_bytes, sha256) = match source {
            EvidenceSource::Bytes(bytes) => {
                let size = bytes.len() as u64;
                if size > limit {
                    return Err(TalosError::ArtifactTooLarge {
                        kind: kind.to_string(),
                        size_bytes: size,
                        limit_bytes: limit,
                    });
                }
                let name = format!("{artifact_id}.bin");
                fs::write(evidence_dir.join(&name), bytes)
                    .await
                    .map_err(|e| TalosError::io("writing evidence payload", e))?;
                (name, size, hash_content(bytes))
            }
            EvidenceSource::Path(path) => {
                if !path.exists() {
                    return Err(TalosError::PathNotFound(path.to_path_buf()));
                }
                if kind == ArtifactKind::Directory {
                    self.attach_directory(&evidence_dir, &artifact_id, path, limit)
                        .await?
                } else {
                    self.attach_file(&evidence_dir, &artifact_id, path, kind, limit)
                        .await?
                }
            }
        };

        let artifact = EvidenceArtifact {
            artifact_id: artifact_id.clone(),
            kind,
            path: PathBuf::from(file_name),
            size_bytes,
            sha256,
            created_at: Utc::now(),
        };

        bundle.evidence.push(artifact.clone());

        info!(
            task_id = %bundle.task_id,
            artifact_id = %artifact_id,
            kind = %kind,
            size_bytes,
            "evidence attached"
        );
        Ok(artifact)
    }

    async fn attach_file(
        &self,
        evidence_dir: &Path,
        artifact_id: &str,
        source: &Path,
        kind: ArtifactKind,
        limit: u64,
    ) -> TalosResult<(String, u64, String)> {
        let meta = fs::metadata(source)
            .await
            .map_err(|e| TalosError::io(format!("reading metadata of {}", source.display()), e))?;
        if !meta.is_file() {
            return Err(TalosError::PathInvalid {
                path: source.to_path_buf(),
                reason: format!("expected a file for kind {kind}"),
            });
        }
        if meta.len() > limit {
            return Err(TalosError::ArtifactTooLarge {
                kind: kind.to_string(),
                size_bytes: meta.len(),
                limit_bytes: limit,
            });
        }

        let extension = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = format!("{artifact_id}{extension}");

        let bytes = fs::read(source)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", source.display()), e))?;
        fs::write(evidence_dir.join(&name), &bytes)
            .await
            .map_err(|e| TalosError::io("writing evidence payload", e))?;

        Ok((name, meta.len(), hash_content(&bytes)))
    }

    /// Compress a directory into a single archive before storage
    async fn attach_directory(
        &self,
        evidence_dir: &Path,
        artifact_id: &str,
        source: &Path,
        limit: u64,
    ) -> TalosResult<(String, u64, String)> {
        let name = format!("{artifact_id}.tar.gz");
        let dest = evidence_dir.join(&name);

        archive_directory(source, &dest).await?;

        let meta = fs::metadata(&dest)
            .await
            .map_err(|e| TalosError::io("reading archive metadata", e))?;
        if meta.len() > limit {
            let _ = fs::remove_file(&dest).await;
            return Err(TalosError::ArtifactTooLarge {
                kind: ArtifactKind::Directory.to_string(),
                size_bytes: meta.len(),
                limit_bytes: limit,
            });
        }

        let bytes = fs::read(&dest)
            .await
            .map_err(|e| TalosError::io("reading archive", e))?;
        debug!(archive = %dest.display(), size = meta.len(), "directory archived");

        Ok((name, meta.len(), hash_content(&bytes)))
    }

    /// Read-only enumeration; does not re-verify hashes
    pub fn list<'b>(&self, bundle: &'b TaskContextBundle) -> &'b [EvidenceArtifact] {
        &bundle.evidence
    }

    /// Recompute the stored payload's hash and compare.
    ///
    /// Consumers call this before trusting a cached artifact; listing
    /// stays cheap by skipping it.
    pub async fn verify(&self, task_id: &str, artifact: &EvidenceArtifact) -> TalosResult<bool> {
        let path = self.store.evidence_dir(task_id).join(&artifact.path);
        if !path.exists() {
            return Err(TalosError::ArtifactNotFound(artifact.artifact_id.clone()));
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", path.display()), e))?;
        Ok(hash_content(&bytes) == artifact.sha256)
    }

    /// Like `verify`, but corrupt payloads are an error
    pub async fn verify_strict(
        &self,
        task_id: &str,
        artifact: &EvidenceArtifact,
    ) -> TalosResult<()> {
        let path = self.store.evidence_dir(task_id).join(&artifact.path);
        if !path.exists() {
            return Err(TalosError::ArtifactNotFound(artifact.artifact_id.clone()));
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| TalosError::io(format!("reading {}", path.display()), e))?;
        let actual = hash_content(&bytes);
        if actual != artifact.sha256 {
            return Err(TalosError::ArtifactCorrupt {
                artifact_id: artifact.artifact_id.clone(),
                expected: artifact.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Remove an attached payload whose bundle write did not land.
    ///
    /// Best-effort: the payload is unreferenced either way, so a
    /// failure here only warrants a warning.
    pub async fn discard(&self, task_id: &str, artifact: &EvidenceArtifact) {
        let path = self.store.evidence_dir(task_id).join(&artifact.path);
        if let Err(e) = fs::remove_file(&path).await {
            warn!(
                task_id,
                artifact_id = %artifact.artifact_id,
                error = %e,
                "orphan evidence payload not removed"
            );
        }
    }

    /// Rewrite the on-disk artifact index from the bundle record.
    ///
    /// Called only after the bundle document has been persisted; the
    /// document is authoritative and the index mirrors it for tooling.
    pub async fn sync_index(&self, bundle: &TaskContextBundle) -> TalosResult<()> {
        let path = self.store.evidence_dir(&bundle.task_id).join("index.json");
        let text = serde_json::to_string_pretty(&bundle.evidence)?;
        fs::write(&path, text)
            .await
            .map_err(|e| TalosError::io("writing evidence index", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImmutableSnapshot;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (EvidenceManager, TaskContextBundle) {
        let store = BundleStore::new(dir.path().to_path_buf());
        let manager = EvidenceManager::new(store, EvidenceConfig::default());
        let bundle = TaskContextBundle::new(
            "T-1".to_string(),
            ImmutableSnapshot {
                requirements_text: "Build X".to_string(),
                plan_steps: vec!["step1".to_string()],
                standards_excerpts: vec![],
                source_commit: "c0ffee".to_string(),
                source_paths: vec![PathBuf::from("src")],
            },
        );
        (manager, bundle)
    }

    #[tokio::test]
    async fn attach_bytes_and_verify() {
        let dir = TempDir::new().unwrap();
        let (manager, mut bundle) = setup(&dir);

        let artifact = manager
            .attach(&mut bundle, ArtifactKind::Log, EvidenceSource::Bytes(b"line\n"))
            .await
            .unwrap();

        assert_eq!(artifact.size_bytes, 5);
        assert_eq!(bundle.evidence.len(), 1);
        assert!(manager.verify("T-1", &artifact).await.unwrap());
    }

    #[tokio::test]
    async fn oversized_bytes_rejected() {
        let dir = TempDir::new().unwrap();
        let store = BundleStore::new(dir.path().to_path_buf());
        let manager = EvidenceManager::new(
            store,
            EvidenceConfig {
                max_log_bytes: 4,
                ..EvidenceConfig::default()
            },
        );
        let (_, mut bundle) = setup(&dir);

        let err = manager
            .attach(&mut bundle, ArtifactKind::Log, EvidenceSource::Bytes(b"too big"))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "ARTIFACT_TOO_LARGE");
        assert!(bundle.evidence.is_empty());
        // Nothing persisted
        assert!(!dir
            .path()
            .join("bundles/T-1/evidence")
            .read_dir()
            .map(|mut d| d.next().is_some())
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn attach_file_copies_payload() {
        let dir = TempDir::new().unwrap();
        let (manager, mut bundle) = setup(&dir);

        let source = dir.path().join("report.txt");
        tokio::fs::write(&source, b"report body").await.unwrap();

        let artifact = manager
            .attach(&mut bundle, ArtifactKind::File, EvidenceSource::Path(&source))
            .await
            .unwrap();

        assert!(artifact.path.to_string_lossy().ends_with(".txt"));
        assert!(manager.verify("T-1", &artifact).await.unwrap());
    }

    #[tokio::test]
    async fn attach_directory_archives() {
        let dir = TempDir::new().unwrap();
        let (manager, mut bundle) = setup(&dir);

        let source = dir.path().join("outputs");
        tokio::fs::create_dir_all(source.join("nested")).await.unwrap();
        tokio::fs::write(source.join("a.txt"), b"alpha").await.unwrap();
        tokio::fs::write(source.join("nested/b.txt"), b"beta").await.unwrap();

        let artifact = manager
            .attach(
                &mut bundle,
                ArtifactKind::Directory,
                EvidenceSource::Path(&source),
            )
            .await
            .unwrap();

        assert!(artifact.path.to_string_lossy().ends_with(".tar.gz"));
        assert!(artifact.size_bytes > 0);
        assert!(manager.verify("T-1", &artifact).await.unwrap());
    }

    #[tokio::test]
    async fn corrupted_payload_fails_verification() {
        let dir = TempDir::new().unwrap();
        let (manager, mut bundle) = setup(&dir);

        let artifact = manager
            .attach(&mut bundle, ArtifactKind::Log, EvidenceSource::Bytes(b"original"))
            .await
            .unwrap();

        let payload = dir.path().join("bundles/T-1/evidence").join(&artifact.path);
        tokio::fs::write(&payload, b"tampered").await.unwrap();

        assert!(!manager.verify("T-1", &artifact).await.unwrap());
        let err = manager.verify_strict("T-1", &artifact).await.unwrap_err();
        assert_eq!(err.error_code(), "ARTIFACT_CORRUPT");
    }

    #[tokio::test]
    async fn index_mirrors_bundle_after_sync() {
        let dir = TempDir::new().unwrap();
        let (manager, mut bundle) = setup(&dir);

        manager
            .attach(&mut bundle, ArtifactKind::Log, EvidenceSource::Bytes(b"x"))
            .await
            .unwrap();

        // Attach alone leaves no index; the caller syncs after the
        // bundle document lands
        let index = dir.path().join("bundles/T-1/evidence/index.json");
        assert!(!index.exists());

        manager.sync_index(&bundle).await.unwrap();
        let text = tokio::fs::read_to_string(&index).await.unwrap();
        let parsed: Vec<EvidenceArtifact> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn discard_removes_payload() {
        let dir = TempDir::new().unwrap();
        let (manager, mut bundle) = setup(&dir);

        let artifact = manager
            .attach(&mut bundle, ArtifactKind::Log, EvidenceSource::Bytes(b"x"))
            .await
            .unwrap();
        let payload = dir.path().join("bundles/T-1/evidence").join(&artifact.path);
        assert!(payload.exists());

        manager.discard("T-1", &artifact).await;
        assert!(!payload.exists());
    }
}
