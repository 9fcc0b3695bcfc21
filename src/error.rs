//! Error types for the edgequake-linearize library.
//!
//! Two tiers reflect two failure scopes:
//!
//! * [`LinearizeError`] — **Request-level**: the batch cannot be answered at
//!   all (nothing uploaded, unreadable form, the single document failed, the
//!   output stream broke). Returned as `Err(LinearizeError)` from the
//!   top-level entry points.
//!
//! * [`JobError`] — **Per-input**: one document of a multi-document batch
//!   failed. Carried inside [`crate::pipeline::dispatch::JobResult`] and never
//!   escapes it; the archive simply has no entry for that input.
//!
//! [`TransformError`] is what the external linearize operation reports; the
//! adapter decides which tier it lands in.

use std::path::PathBuf;
use thiserror::Error;

/// All request-level errors returned by the edgequake-linearize library.
#[derive(Debug, Error)]
pub enum LinearizeError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// The batch contained no documents.
    #[error("No files were uploaded")]
    NoInputs,

    /// The request body could not be parsed into a batch.
    #[error("Could not read the uploaded form: {detail}")]
    MalformedBatch { detail: String },

    // ── Single-document errors ────────────────────────────────────────────
    /// The input could not be copied to its staging file.
    #[error("Failed to stage '{name}': {source}")]
    Staging {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The only document in the batch failed to linearize.
    #[error("Linearize failed for '{name}': {detail}")]
    Transform { name: String, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The archive output stream failed (typically a client disconnect).
    #[error("Archive output failed: {source}")]
    ArchiveWrite {
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Server errors ─────────────────────────────────────────────────────
    /// The HTTP listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an IO error.
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input of a batch.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum JobError {
    /// The upload could not be written to its staging file.
    #[error("{name}: staging failed: {detail}")]
    Staging { name: String, detail: String },

    /// The transform failed and left nothing usable behind.
    #[error("{name}: linearize failed: {detail}")]
    Transform {
        name: String,
        detail: String,
        diagnostics: String,
    },

    /// The transform reported success but wrote zero bytes.
    #[error("{name}: linearize produced no output")]
    EmptyOutput { name: String, diagnostics: String },

    /// The worker panicked while processing this input.
    #[error("{name}: worker panicked: {detail}")]
    Panicked { name: String, detail: String },
}

impl JobError {
    /// Display name of the input this error belongs to.
    pub fn name(&self) -> &str {
        match self {
            JobError::Staging { name, .. }
            | JobError::Transform { name, .. }
            | JobError::EmptyOutput { name, .. }
            | JobError::Panicked { name, .. } => name,
        }
    }
}

/// Failure reported by a [`crate::pipeline::transform::Transform`].
#[derive(Debug, Error)]
pub enum TransformError {
    /// The external program could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Moving bytes between the transform and its sink failed.
    #[error("stream copy error: {0}")]
    Io(#[from] std::io::Error),

    /// The transform ran but reported a failure status.
    #[error("{status}\nStderr:\n{diagnostics}")]
    Failed { status: String, diagnostics: String },
}

impl TransformError {
    /// Captured diagnostic text, if the transform produced any.
    pub fn diagnostics(&self) -> &str {
        match self {
            TransformError::Failed { diagnostics, .. } => diagnostics,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_inputs_display() {
        assert_eq!(LinearizeError::NoInputs.to_string(), "No files were uploaded");
    }

    #[test]
    fn transform_display_includes_name() {
        let e = LinearizeError::Transform {
            name: "report.pdf".into(),
            detail: "exit status: 2".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("report.pdf"), "got: {msg}");
        assert!(msg.contains("exit status: 2"), "got: {msg}");
    }

    #[test]
    fn job_error_name() {
        let e = JobError::EmptyOutput {
            name: "a.pdf".into(),
            diagnostics: String::new(),
        };
        assert_eq!(e.name(), "a.pdf");
        assert!(e.to_string().contains("no output"));
    }

    #[test]
    fn transform_failed_carries_stderr() {
        let e = TransformError::Failed {
            status: "exit status: 2".into(),
            diagnostics: "qpdf: file is damaged".into(),
        };
        assert_eq!(e.diagnostics(), "qpdf: file is damaged");
        assert!(e.to_string().contains("Stderr:"));
    }

    #[test]
    fn bind_display_includes_address() {
        let e = LinearizeError::Bind {
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: std::io::ErrorKind::AddrInUse.into(),
        };
        assert!(e.to_string().contains("127.0.0.1:8080"));
    }

    #[test]
    fn job_error_serialises() {
        let e = JobError::Staging {
            name: "x.pdf".into(),
            detail: "disk full".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("disk full"));
    }
}
