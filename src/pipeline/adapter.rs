//! Transform Adapter: staging, invocation and output verification around a
//! [`Transform`].
//!
//! Two modes:
//!
//! * [`Linearizer::run_stream`] — stream-through. Output goes straight into
//!   the caller's sink. Only used when the batch has exactly one document.
//! * [`Linearizer::run_to_artifact`] — materialise. Output goes into a
//!   private [`Artifact`] that the caller then owns.
//!
//! In both modes the staged input is deleted before the call returns.

use crate::config::LinearizeConfig;
use crate::error::{JobError, LinearizeError, TransformError};
use crate::pipeline::artifact::{self, Artifact};
use crate::pipeline::input::{self, Input};
use crate::pipeline::transform::{QpdfTransform, Transform};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Runs a [`Transform`] on [`Input`]s.
#[derive(Clone)]
pub struct Linearizer {
    transform: Arc<dyn Transform>,
    temp_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Linearizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linearizer")
            .field("transform", &self.transform.name())
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

impl Linearizer {
    pub fn new(transform: Arc<dyn Transform>) -> Self {
        Self {
            transform,
            temp_dir: None,
        }
    }

    /// Build a qpdf-backed linearizer from the config.
    pub fn from_config(config: &LinearizeConfig) -> Self {
        let qpdf = QpdfTransform::new(&config.qpdf_path).with_args(config.qpdf_args.clone());
        Self::new(Arc::new(qpdf)).with_temp_dir(config.temp_dir.clone())
    }

    /// Directory for staging files and artifacts (`None` = OS temp dir).
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Linearize `input` directly into `sink`.
    ///
    /// On failure, bytes may already have reached `sink`.
    pub async fn run_stream(
        &self,
        input: &Input,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), LinearizeError> {
        let staged = input::stage(input, self.temp_dir.as_deref())
            .await
            .map_err(|e| LinearizeError::Staging {
                name: input.name().to_string(),
                source: e,
            })?;

        let outcome = self.transform.run(&staged, sink).await;
        drop(staged);

        match outcome {
            Ok(diagnostics) => {
                if !diagnostics.is_empty() {
                    warn!(
                        "{} warnings for '{}': {}",
                        self.transform.name(),
                        input.name(),
                        diagnostics.as_str().trim()
                    );
                }
                Ok(())
            }
            Err(e) => Err(LinearizeError::Transform {
                name: input.name().to_string(),
                detail: e.to_string(),
            }),
        }
    }

    /// Linearize `input` into a fresh artifact and hand ownership to the caller.
    ///
    /// The returned artifact exists and is non-empty. A transform that
    /// reports failure but still wrote output counts as success with a
    /// warning; one that wrote nothing is a hard failure and leaves no files.
    pub async fn run_to_artifact(&self, input: &Input) -> Result<Artifact, JobError> {
        let name = input.name();
        let staging_err = |e: std::io::Error| JobError::Staging {
            name: name.to_string(),
            detail: e.to_string(),
        };

        let staged = input::stage(input, self.temp_dir.as_deref())
            .await
            .map_err(staging_err)?;
        let (mut file, mut artifact) =
            artifact::create(self.temp_dir.as_deref()).map_err(staging_err)?;

        let mut outcome = self.transform.run(&staged, &mut file).await;
        if let Err(e) = file.flush().await {
            if outcome.is_ok() {
                outcome = Err(TransformError::Io(e));
            }
        }
        drop(file);
        drop(staged);

        let produced = artifact.verified_len().await;
        match (outcome, produced) {
            (Ok(diagnostics), Some(len)) => {
                if !diagnostics.is_empty() {
                    warn!(
                        "{} warnings for '{}': {}",
                        self.transform.name(),
                        name,
                        diagnostics.as_str().trim()
                    );
                }
                debug!("'{}' → {} ({} bytes)", name, artifact.path().display(), len);
                Ok(artifact)
            }
            (Err(e @ TransformError::Failed { .. }), Some(len)) => {
                warn!(
                    "{} reported failure for '{}' but produced {} bytes, keeping output: {}",
                    self.transform.name(),
                    name,
                    len,
                    e
                );
                Ok(artifact)
            }
            (Ok(diagnostics), None) => {
                let _ = artifact.discard();
                Err(JobError::EmptyOutput {
                    name: name.to_string(),
                    diagnostics: diagnostics.as_str().to_string(),
                })
            }
            (Err(e), _) => {
                let _ = artifact.discard();
                Err(JobError::Transform {
                    name: name.to_string(),
                    diagnostics: e.diagnostics().to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }
}
