//! Configuration for the linearize pipeline and its HTTP surface.
//!
//! All behaviour is controlled through [`LinearizeConfig`], built via its
//! [`LinearizeConfigBuilder`]. The worker-pool size is fixed for the lifetime
//! of a pipeline; nothing here adapts at runtime.

use crate::error::LinearizeError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Suggested filename for multi-document responses.
pub const DEFAULT_ARCHIVE_NAME: &str = "linearized_files.zip";

/// Configuration for a linearize batch.
///
/// # Example
/// ```rust
/// use edgequake_linearize::LinearizeConfig;
///
/// let config = LinearizeConfig::builder()
///     .concurrency(3)
///     .qpdf_path("/usr/local/bin/qpdf")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 3);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct LinearizeConfig {
    /// Number of transforms allowed to run at once. Default: 2.
    ///
    /// Each transform spawns a qpdf process that is CPU- and IO-heavy on large
    /// documents, so the pool stays small. Raise it on machines with many
    /// cores and fast disks.
    pub concurrency: usize,

    /// Path or name of the qpdf executable. Default: `qpdf` (resolved via PATH).
    pub qpdf_path: PathBuf,

    /// Extra arguments passed to qpdf before `--linearize`.
    pub qpdf_args: Vec<String>,

    /// Directory for staged inputs and artifacts. Default: the OS temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Suggested filename for multi-document responses. Default: `linearized_files.zip`.
    pub archive_name: String,

    /// Maximum accepted request body, in bytes. Default: 256 MiB.
    pub max_upload_bytes: usize,

    /// Address the HTTP server listens on. Default: `0.0.0.0:8080`.
    pub bind_addr: SocketAddr,

    /// Optional per-document progress events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LinearizeConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            qpdf_path: PathBuf::from("qpdf"),
            qpdf_args: Vec::new(),
            temp_dir: None,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            max_upload_bytes: 256 * 1024 * 1024,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LinearizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearizeConfig")
            .field("concurrency", &self.concurrency)
            .field("qpdf_path", &self.qpdf_path)
            .field("qpdf_args", &self.qpdf_args)
            .field("temp_dir", &self.temp_dir)
            .field("archive_name", &self.archive_name)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("bind_addr", &self.bind_addr)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl LinearizeConfig {
    /// Create a new builder for `LinearizeConfig`.
    pub fn builder() -> LinearizeConfigBuilder {
        LinearizeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`LinearizeConfig`].
pub struct LinearizeConfigBuilder {
    config: LinearizeConfig,
}

impl fmt::Debug for LinearizeConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearizeConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl LinearizeConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn qpdf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.qpdf_path = path.into();
        self
    }

    pub fn qpdf_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.qpdf_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.config.archive_name = name.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LinearizeConfig, LinearizeError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(LinearizeError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.archive_name.trim().is_empty() {
            return Err(LinearizeError::InvalidConfig(
                "Archive name must not be empty".into(),
            ));
        }
        if c.qpdf_path.as_os_str().is_empty() {
            return Err(LinearizeError::InvalidConfig(
                "qpdf path must not be empty".into(),
            ));
        }
        if let Some(ref dir) = c.temp_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(LinearizeError::InvalidConfig(format!(
                    "Temp dir '{}' is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let c = LinearizeConfig::default();
        assert_eq!(c.concurrency, 2);
        assert_eq!(c.archive_name, "linearized_files.zip");
        assert_eq!(c.bind_addr.port(), 8080);
        assert!(c.temp_dir.is_none());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = LinearizeConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn empty_archive_name_rejected() {
        let err = LinearizeConfig::builder()
            .archive_name("  ")
            .build()
            .unwrap_err();
        assert!(matches!(err, LinearizeError::InvalidConfig(_)));
    }

    #[test]
    fn temp_dir_must_be_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = LinearizeConfig::builder()
            .temp_dir(file.path())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"), "got: {err}");
    }

    #[test]
    fn config_serialises_without_callback() {
        let c = LinearizeConfig::builder()
            .qpdf_args(["--object-streams=generate"])
            .build()
            .unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("object-streams"));
        assert!(!json.contains("progress_callback"));
    }
}
