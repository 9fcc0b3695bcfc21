//! Pipeline stages for batch linearization.
//!
//! Each submodule owns one step, so a stage can be tested on its own and the
//! transform can be swapped (tests use in-process fakes) without touching
//! the rest.
//!
//! ## Data Flow
//!
//! ```text
//!                         ┌─ one input ──▶ adapter::run_stream ──────────────▶ sink
//! input ──▶ (batch size) ─┤
//!                         └─ N inputs ──▶ dispatch ──▶ ResultStream ──▶ assemble ──▶ ZIP sink
//!                                         (K workers,    (completion     (one entry per
//!                                          run_to_artifact) order)         success)
//! ```
//!
//! 1. [`input`]     — name and hold an uploaded document; stage it to a file
//! 2. [`transform`] — the external linearize operation (qpdf) behind a trait
//! 3. [`adapter`]   — staging, invocation and output checks around a transform
//! 4. [`artifact`]  — self-deleting output files and their ownership
//! 5. [`dispatch`]  — bounded worker pool producing one result per input
//! 6. [`assemble`]  — single consumer that streams results into a ZIP

pub mod adapter;
pub mod artifact;
pub mod assemble;
pub mod dispatch;
pub mod input;
pub mod transform;
