//! The linearize operation as a capability.
//!
//! The pipeline only needs "read a document from this path, write the
//! linearized bytes to this sink". [`Transform`] captures exactly that, so
//! the production [`QpdfTransform`] (a child process) and in-process fakes
//! used by tests are interchangeable.
//!
//! A transform may print diagnostics even when it succeeds; those come back
//! as [`Diagnostics`] and are never an error by themselves.

use crate::error::TransformError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Exit status qpdf uses for "succeeded, but printed warnings".
const QPDF_EXIT_WARNINGS: i32 = 3;

/// Diagnostic text captured from a transform run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(String);

impl Diagnostics {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One invocation of the opaque linearize operation.
///
/// Implementations write output to `sink` as it becomes available and must
/// not buffer the whole document first. On failure, bytes already written
/// to `sink` stay there.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "transform"
    }

    async fn run(
        &self,
        input: &Path,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Diagnostics, TransformError>;
}

/// `qpdf --linearize <input> -` with stdout streamed into the sink.
#[derive(Debug, Clone)]
pub struct QpdfTransform {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl QpdfTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Extra arguments placed before `--linearize`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for QpdfTransform {
    fn default() -> Self {
        Self::new("qpdf")
    }
}

#[async_trait]
impl Transform for QpdfTransform {
    fn name(&self) -> &str {
        "qpdf"
    }

    async fn run(
        &self,
        input: &Path,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Diagnostics, TransformError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args)
            .arg("--linearize")
            .arg(input)
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| TransformError::Spawn {
            program: self.program.display().to_string(),
            source: e,
        })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("qpdf stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("qpdf stderr was not captured"))?;

        // Drain stderr concurrently so a chatty qpdf never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let copied = match tokio::io::copy(&mut stdout, sink).await {
            Ok(n) => n,
            Err(e) => {
                let _ = child.kill().await;
                return Err(TransformError::Io(e));
            }
        };
        sink.flush().await?;

        let status = child.wait().await?;
        let diagnostics = Diagnostics::new(String::from_utf8_lossy(
            &stderr_task.await.unwrap_or_default(),
        ));
        debug!(
            "qpdf {} → {} bytes, {}",
            input.display(),
            copied,
            status
        );

        if status.success() || status.code() == Some(QPDF_EXIT_WARNINGS) {
            Ok(diagnostics)
        } else {
            Err(TransformError::Failed {
                status: status.to_string(),
                diagnostics: diagnostics.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_whitespace_is_empty() {
        assert!(Diagnostics::new(" \n").is_empty());
        assert!(!Diagnostics::new("WARNING: xref").is_empty());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let t = QpdfTransform::new("/nonexistent/qpdf-binary");
        let mut sink = Vec::new();
        let err = t
            .run(Path::new("/tmp/whatever.pdf"), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }), "got: {err}");
        assert!(sink.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_failed_with_stderr() {
        // `sh -c 'echo boom >&2; exit 2' --linearize <in> -`
        let t = QpdfTransform::new("sh").with_args(vec![
            "-c".into(),
            "echo boom >&2; exit 2".into(),
        ]);
        let mut sink = Vec::new();
        let err = t
            .run(Path::new("/dev/null"), &mut sink)
            .await
            .unwrap_err();
        match err {
            TransformError::Failed { diagnostics, .. } => assert!(diagnostics.contains("boom")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_is_streamed_into_sink() {
        let t = QpdfTransform::new("sh").with_args(vec![
            "-c".into(),
            "printf '%%PDF-1.7 linearized'; echo note >&2; exit 3".into(),
        ]);
        let mut sink = Vec::new();
        let diag = t.run(Path::new("/dev/null"), &mut sink).await.unwrap();
        assert_eq!(sink, b"%PDF-1.7 linearized");
        assert_eq!(diag.as_str().trim(), "note");
    }
}
