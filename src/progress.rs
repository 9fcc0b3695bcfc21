//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::LinearizeConfigBuilder::progress_callback`] to receive
//! events as the worker pool processes each document.
//!
//! Workers run concurrently, so `on_job_start`, `on_job_complete` and
//! `on_job_error` may be called from different tasks at the same time.
//!
//! # Example
//!
//! ```rust
//! use edgequake_linearize::{BatchProgressCallback, LinearizeConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, name: &str, bytes: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{name} done ({bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = LinearizeConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each document of a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is dispatched.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker picks up a document.
    fn on_job_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when a document's artifact has been written to the output.
    ///
    /// * `bytes` — size of the linearized document
    fn on_job_complete(&self, name: &str, bytes: u64) {
        let _ = (name, bytes);
    }

    /// Called when a document fails or is skipped.
    ///
    /// Takes an owned `String` so implementations can move it into a
    /// spawned task without borrowing from the pipeline.
    fn on_job_error(&self, name: &str, error: String) {
        let _ = (name, error);
    }

    /// Called once after the archive has been finalised.
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::LinearizeConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_job_start(&self, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _name: &str, _bytes: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _name: &str, _error: String) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_job_start("a.pdf");
        cb.on_job_complete("a.pdf", 42);
        cb.on_job_error("b.pdf", "broken".into());
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_job_start("a.pdf");
        tracker.on_job_start("b.pdf");
        tracker.on_job_complete("a.pdf", 10);
        tracker.on_job_error("b.pdf", "exit status: 2".into());
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn arc_dyn_callback_moves_into_spawn() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        tokio::spawn(async move {
            cb.on_job_error("c.pdf", "timeout".to_string());
        })
        .await
        .expect("spawn must succeed");
    }
}
