//! Directory archiving for evidence storage

use crate::error::{TalosError, TalosResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Total byte size of every file under `dir`
pub fn directory_size(dir: &Path) -> TalosResult<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| TalosError::PathInvalid {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() {
            let meta = entry.metadata().map_err(|e| TalosError::PathInvalid {
                path: entry.path().to_path_buf(),
                reason: e.to_string(),
            })?;
            total += meta.len();
        }
    }
    Ok(total)
}

/// Compress `source` into a gzip tarball at `dest`.
///
/// Entry paths are relative to `source` so the archive extracts
/// cleanly. The tar build is synchronous, so it runs on a blocking
/// thread.
pub async fn archive_directory(source: &Path, dest: &Path) -> TalosResult<()> {
    let source: PathBuf = source.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> TalosResult<()> {
        let file = std::fs::File::create(&dest)
            .map_err(|e| TalosError::io(format!("creating {}", dest.display()), e))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        builder
            .append_dir_all(".", &source)
            .map_err(|e| TalosError::io(format!("archiving {}", source.display()), e))?;

        let encoder = builder
            .into_inner()
            .map_err(|e| TalosError::io("finalizing archive", e))?;
        encoder
            .finish()
            .map_err(|e| TalosError::io("flushing archive", e))?;
        Ok(())
    })
    .await
    .map_err(|e| TalosError::Internal(format!("archive task panicked: {e}")))?
}
