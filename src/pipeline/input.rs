//! Inputs: one submitted document and its staging copy.
//!
//! qpdf reads from a file path, not from a pipe, so every input is copied to
//! a private staging file before the transform runs. The staging file is a
//! [`TempPath`]: it is deleted when dropped, on every exit path of the
//! caller, including panics.

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;

/// Where an input's bytes come from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Bytes already held in memory (an uploaded multipart field).
    Bytes(Bytes),
    /// A local file (CLI usage).
    File(PathBuf),
}

/// One submitted document. Immutable once accepted.
#[derive(Debug, Clone)]
pub struct Input {
    name: String,
    source: InputSource,
}

impl Input {
    /// Create an input from in-memory bytes. `name` is sanitised.
    pub fn from_bytes(name: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: display_name(Some(name), 1),
            source: InputSource::Bytes(bytes.into()),
        }
    }

    /// Create an input backed by a local file; the display name is its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Self {
            name: display_name(raw.as_deref(), 1),
            source: InputSource::File(path),
        }
    }

    /// Create an input with an already-sanitised display name.
    pub(crate) fn with_name(name: String, source: InputSource) -> Self {
        Self { name, source }
    }

    /// Display name used for archive entries and download filenames.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    /// Open the input for reading.
    pub async fn open(&self) -> std::io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.source {
            InputSource::Bytes(b) => Ok(Box::new(std::io::Cursor::new(b.clone()))),
            InputSource::File(p) => Ok(Box::new(tokio::fs::File::open(p).await?)),
        }
    }
}

// ── Display names ────────────────────────────────────────────────────────────

static RE_UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\x00-\x1f\x7f"*:<>?|]"#).unwrap());

/// Turn a client-supplied filename into a safe display name.
///
/// Directory components are dropped (both `/` and `\`), characters that are
/// invalid in ZIP entry names or `Content-Disposition` values are replaced
/// with `_`. Empty results fall back to `document-{index}.pdf`.
pub fn display_name(raw: Option<&str>, index: usize) -> String {
    let base = raw
        .unwrap_or("")
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("");
    let cleaned = RE_UNSAFE_NAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        format!("document-{index}.pdf")
    } else {
        cleaned.to_string()
    }
}

// ── Staging ──────────────────────────────────────────────────────────────────

/// Copy `input` to a fresh `input-*.pdf` file in `temp_dir` (or the OS temp dir).
///
/// On error the partially written file is removed before returning.
pub async fn stage(input: &Input, temp_dir: Option<&Path>) -> std::io::Result<TempPath> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("input-").suffix(".pdf");
    let tmp = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    let (file, path) = tmp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut reader = input.open().await?;
    let copied = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;

    debug!(
        "Staged '{}' → {} ({} bytes)",
        input.name(),
        path.display(),
        copied
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_strips_directories() {
        assert_eq!(display_name(Some("a/b/report.pdf"), 1), "report.pdf");
        assert_eq!(display_name(Some(r"C:\docs\scan.pdf"), 1), "scan.pdf");
    }

    #[test]
    fn display_name_replaces_unsafe_chars() {
        assert_eq!(display_name(Some("q\"uote?.pdf"), 1), "q_uote_.pdf");
        assert_eq!(display_name(Some("tab\there.pdf"), 1), "tab_here.pdf");
    }

    #[test]
    fn display_name_falls_back() {
        assert_eq!(display_name(None, 3), "document-3.pdf");
        assert_eq!(display_name(Some("   "), 1), "document-1.pdf");
        assert_eq!(display_name(Some("dir/.."), 2), "document-2.pdf");
    }

    #[tokio::test]
    async fn stage_copies_bytes_and_cleans_up_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let input = Input::from_bytes("x.pdf", &b"%PDF-1.7 body"[..]);

        let staged = stage(&input, Some(dir.path())).await.unwrap();
        let path = staged.to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 body");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("input-"));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stage_from_missing_file_fails_without_leaking() {
        let dir = tempfile::tempdir().unwrap();
        let input = Input::from_path(dir.path().join("missing.pdf"));

        assert!(stage(&input, Some(dir.path())).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn from_path_uses_file_name() {
        let input = Input::from_path("/tmp/some/dir/paper.pdf");
        assert_eq!(input.name(), "paper.pdf");
    }
}
