//! Artifacts: materialised transform output waiting for its turn in the archive.
//!
//! An [`Artifact`] owns exactly one file. Ownership moves with the value:
//! the worker that created it hands it over inside a
//! [`crate::pipeline::dispatch::JobResult`], and whoever holds it last is
//! responsible for deleting it. Deletion happens either explicitly through
//! [`Artifact::discard`] or implicitly on drop, so an artifact cannot outlive
//! the request even when a task panics or a channel is torn down.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// An owned, self-deleting transform output file.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    file: Option<TempPath>,
}

impl Artifact {
    pub(crate) fn new(file: TempPath) -> Self {
        Self {
            path: file.to_path_buf(),
            file: Some(file),
        }
    }

    /// Location of the artifact on disk (still reported after discard).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` once the file has been deleted through [`Artifact::discard`].
    pub fn is_discarded(&self) -> bool {
        self.file.is_none()
    }

    /// Size of the artifact if it still exists and is non-empty.
    ///
    /// Returns `None` for a discarded, vanished, or zero-length artifact.
    pub async fn verified_len(&self) -> Option<u64> {
        if self.file.is_none() {
            return None;
        }
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
            Ok(_) => None,
            Err(e) => {
                debug!("Artifact {} not readable: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Delete the artifact. Calling it again is a no-op.
    ///
    /// A file that already vanished counts as deleted.
    pub fn discard(&mut self) -> io::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        match file.close() {
            Ok(()) => {
                debug!("Removed artifact {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove artifact {}: {}", self.path.display(), e);
                Err(e)
            }
        }
    }
}

/// Create a fresh, empty `output-*.pdf` artifact in `temp_dir` (or the OS temp dir).
pub(crate) fn create(temp_dir: Option<&Path>) -> io::Result<(tokio::fs::File, Artifact)> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("output-").suffix(".pdf");
    let tmp = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    let (file, path) = tmp.into_parts();
    Ok((tokio::fs::File::from_std(file), Artifact::new(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn empty_artifact_is_not_verified() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, artifact) = create(Some(dir.path())).unwrap();
        assert_eq!(artifact.verified_len().await, None);
    }

    #[tokio::test]
    async fn written_artifact_is_verified() {
        let dir = tempfile::tempdir().unwrap();
        let (mut file, artifact) = create(Some(dir.path())).unwrap();
        file.write_all(b"%PDF-1.4").await.unwrap();
        file.flush().await.unwrap();
        assert_eq!(artifact.verified_len().await, Some(8));
    }

    #[tokio::test]
    async fn discard_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, mut a) = create(Some(dir.path())).unwrap();
        let (_file2, b) = create(Some(dir.path())).unwrap();

        a.discard().unwrap();
        a.discard().unwrap();
        assert!(a.is_discarded());
        assert!(!a.path().exists());
        assert!(b.path().exists(), "other artifacts are untouched");
        assert_eq!(a.verified_len().await, None);
    }

    #[tokio::test]
    async fn vanished_artifact_discards_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, mut a) = create(Some(dir.path())).unwrap();
        std::fs::remove_file(a.path()).unwrap();
        a.discard().unwrap();
    }

    #[tokio::test]
    async fn drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, a) = create(Some(dir.path())).unwrap();
        let path = a.path().to_path_buf();
        drop(a);
        assert!(!path.exists());
    }
}
