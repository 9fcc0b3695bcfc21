//! Output types: batch summaries and response shapes.

use serde::{Deserialize, Serialize};

/// MIME type of a single linearized document.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// MIME type of a multi-document archive.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// What happened to one input of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Submission position (0-based).
    pub index: usize,
    /// Display name (= archive entry name on success).
    pub name: String,
    /// Bytes written into the archive; `None` when the input was skipped.
    pub bytes: Option<u64>,
    /// Why the input was skipped.
    pub error: Option<String>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.bytes.is_some()
    }
}

/// Result of assembling one multi-document batch.
///
/// `reports` is in completion order, which is also the archive entry order
/// for the successful ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Inputs that ended up as archive entries.
    pub succeeded: usize,
    /// Inputs in the batch.
    pub total: usize,
    /// Per-input outcome, in completion order.
    pub reports: Vec<JobReport>,
    /// Wall-clock time from first dispatch to archive finalisation.
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.succeeded)
    }

    /// Archive entry names in the order they were written.
    pub fn entry_names(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.succeeded())
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// How a batch is answered: one document or a streamed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// Exactly one input: the linearized document itself.
    Single { filename: String },
    /// Several inputs: a ZIP streamed with no predetermined length.
    Archive { filename: String },
}

impl ResponseShape {
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseShape::Single { .. } => PDF_CONTENT_TYPE,
            ResponseShape::Archive { .. } => ZIP_CONTENT_TYPE,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ResponseShape::Single { filename } | ResponseShape::Archive { filename } => filename,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, ResponseShape::Archive { .. })
    }

    /// `Content-Disposition` header value suggesting the download name.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: usize, name: &str, ok: bool) -> JobReport {
        JobReport {
            index,
            name: name.into(),
            bytes: ok.then_some(10),
            error: (!ok).then(|| "exit status: 2".to_string()),
        }
    }

    #[test]
    fn summary_counts_and_entry_order() {
        let s = BatchSummary {
            succeeded: 2,
            total: 3,
            reports: vec![report(2, "c.pdf", true), report(0, "a.pdf", false), report(1, "b.pdf", true)],
            duration_ms: 5,
        };
        assert_eq!(s.failed(), 1);
        assert_eq!(s.entry_names(), vec!["c.pdf", "b.pdf"]);
    }

    #[test]
    fn response_shape_headers() {
        let single = ResponseShape::Single {
            filename: "doc.pdf".into(),
        };
        assert_eq!(single.content_type(), "application/pdf");
        assert_eq!(
            single.content_disposition(),
            "attachment; filename=\"doc.pdf\""
        );
        assert!(!single.is_archive());

        let archive = ResponseShape::Archive {
            filename: "linearized_files.zip".into(),
        };
        assert_eq!(archive.content_type(), "application/zip");
        assert!(archive.is_archive());
    }

    #[test]
    fn summary_serialises() {
        let s = BatchSummary {
            succeeded: 1,
            total: 1,
            reports: vec![report(0, "a.pdf", true)],
            duration_ms: 1,
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: BatchSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.reports, s.reports);
    }
}
