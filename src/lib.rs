//! # edgequake-linearize
//!
//! Linearize PDF documents ("fast web view") in batches, with a bounded pool
//! of qpdf workers and a ZIP archive that streams out as documents finish.
//!
//! ## Why this crate?
//!
//! Linearizing a large PDF is slow and IO-heavy, and a batch of them is
//! slower still. Buffering every result before answering wastes memory and
//! keeps the client waiting for the slowest document. This crate runs at
//! most `K` transforms at once, writes each finished document into the
//! archive the moment it is ready, and owns every temporary file so that
//! nothing is left behind, whatever fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads
//!  │
//!  ├─ 1. Input     name + bytes, staged to a private temp file
//!  ├─ 2. Dispatch  K workers run the transform (qpdf --linearize)
//!  ├─ 3. Collect   results in completion order, failures logged and skipped
//!  └─ 4. Archive   stored ZIP entries streamed to the sink, flushed per entry
//! ```
//!
//! A batch of exactly one skips steps 2–4: the transform output is streamed
//! straight to the sink.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_linearize::{linearize_to_file, LinearizeConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LinearizeConfig::builder().concurrency(4).build()?;
//!     let inputs = vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")];
//!     let summary = linearize_to_file(&inputs, "linearized.zip", &config).await?;
//!     eprintln!("{}/{} documents linearized", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdflinearize` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-linearize = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{linearize_batch, linearize_single, linearize_to_file, plan_response};
pub use config::{LinearizeConfig, LinearizeConfigBuilder, DEFAULT_ARCHIVE_NAME};
pub use error::{JobError, LinearizeError, TransformError};
pub use output::{BatchSummary, JobReport, ResponseShape};
pub use pipeline::adapter::Linearizer;
pub use pipeline::input::Input;
pub use pipeline::transform::{Diagnostics, QpdfTransform, Transform};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use server::{router, router_with, serve, serve_on};
