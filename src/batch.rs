//! Top-level batch entry points.
//!
//! A batch of one is streamed straight through the transform; anything
//! larger goes through the worker pool and comes out as a ZIP archive.

use crate::config::LinearizeConfig;
use crate::error::LinearizeError;
use crate::output::{BatchSummary, JobReport, ResponseShape};
use crate::pipeline::adapter::Linearizer;
use crate::pipeline::assemble::assemble;
use crate::pipeline::dispatch::dispatch;
use crate::pipeline::input::Input;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{error, info};

/// Decide how a batch will be answered, before any work starts.
///
/// # Errors
/// [`LinearizeError::NoInputs`] for an empty batch.
pub fn plan_response(
    inputs: &[Input],
    config: &LinearizeConfig,
) -> Result<ResponseShape, LinearizeError> {
    match inputs {
        [] => Err(LinearizeError::NoInputs),
        [only] => Ok(ResponseShape::Single {
            filename: only.name().to_string(),
        }),
        _ => Ok(ResponseShape::Archive {
            filename: config.archive_name.clone(),
        }),
    }
}

/// Stream-through mode: linearize one document directly into `sink`.
///
/// A failure here fails the whole request; there is nothing else to return.
pub async fn linearize_single(
    linearizer: &Linearizer,
    input: &Input,
    sink: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<(), LinearizeError> {
    info!("Linearizing single document '{}'", input.name());
    let result = linearizer.run_stream(input, sink).await;
    if let Err(ref e) = result {
        error!("{}", e);
    }
    result
}

/// Archive mode: run every input through the worker pool and stream the
/// successful outputs into a ZIP written to `sink`.
///
/// Failed inputs are skipped, logged and listed in the returned summary.
///
/// # Errors
/// [`LinearizeError::NoInputs`] for an empty batch,
/// [`LinearizeError::ArchiveWrite`] if `sink` fails.
pub async fn linearize_batch<W>(
    linearizer: &Linearizer,
    inputs: Vec<Input>,
    sink: &mut W,
    config: &LinearizeConfig,
) -> Result<BatchSummary, LinearizeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if inputs.is_empty() {
        return Err(LinearizeError::NoInputs);
    }
    let total = inputs.len();
    info!(
        "Linearizing {} documents with {} workers",
        total, config.concurrency
    );

    let progress = config.progress_callback.clone();
    if let Some(ref cb) = progress {
        cb.on_batch_start(total);
    }

    let results = dispatch(linearizer.clone(), inputs, config.concurrency, progress.clone());
    let summary = assemble(results, sink, progress).await;
    match summary {
        Ok(ref s) if s.succeeded < s.total => {
            info!(
                "{} of {} documents failed and were left out of the archive",
                s.failed(),
                s.total
            );
        }
        Err(ref e) => error!("{}", e),
        _ => {}
    }
    summary
}

/// Linearize local files into `output`.
///
/// One path writes the linearized document itself; several write a ZIP
/// archive. The file is written atomically: output goes to a sibling
/// `.tmp` file that is renamed into place only on success.
pub async fn linearize_to_file(
    paths: &[PathBuf],
    output: impl AsRef<Path>,
    config: &LinearizeConfig,
) -> Result<BatchSummary, LinearizeError> {
    let path = output.as_ref();
    let inputs: Vec<Input> = paths.iter().map(Input::from_path).collect();
    let shape = plan_response(&inputs, config)?;
    let linearizer = Linearizer::from_config(config);

    let write_err = |e: std::io::Error| LinearizeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let is_archive = shape.is_archive();
    let tmp_path = path.with_extension(if is_archive {
        "zip.tmp"
    } else {
        "pdf.tmp"
    });
    let file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(write_err)?;
    let mut writer = BufWriter::new(file);

    let started = Instant::now();
    let outcome = match &shape {
        ResponseShape::Single { .. } => {
            let input = &inputs[0];
            let name = input.name().to_string();
            if let Some(ref cb) = config.progress_callback {
                cb.on_batch_start(1);
                cb.on_job_start(&name);
            }
            let run = linearize_single(&linearizer, input, &mut writer).await;
            if let (Err(e), Some(cb)) = (&run, &config.progress_callback) {
                cb.on_job_error(&name, e.to_string());
                cb.on_batch_complete(1, 0);
            }
            run.map(|()| BatchSummary {
                succeeded: 1,
                total: 1,
                reports: vec![JobReport {
                    index: 0,
                    name,
                    bytes: None,
                    error: None,
                }],
                duration_ms: 0,
            })
        }
        ResponseShape::Archive { .. } => {
            linearize_batch(&linearizer, inputs, &mut writer, config).await
        }
    };

    let finished = match outcome {
        Ok(summary) => writer
            .shutdown()
            .await
            .map_err(write_err)
            .map(|()| summary),
        Err(e) => Err(e),
    };
    drop(writer);

    let mut summary = match finished {
        Ok(summary) => summary,
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
    };

    if !is_archive {
        let len = tokio::fs::metadata(&tmp_path)
            .await
            .map_err(write_err)?
            .len();
        if let Some(report) = summary.reports.first_mut() {
            report.bytes = Some(len);
            if let Some(ref cb) = config.progress_callback {
                cb.on_job_complete(&report.name, len);
                cb.on_batch_complete(1, 1);
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    info!("Wrote {}", path.display());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use crate::pipeline::transform::{Diagnostics, Transform};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    /// Upper-cases the input; inputs containing "junk" fail without output.
    struct Upper;

    #[async_trait]
    impl Transform for Upper {
        async fn run(
            &self,
            input: &Path,
            sink: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<Diagnostics, TransformError> {
            let mut body = String::new();
            tokio::fs::File::open(input)
                .await?
                .read_to_string(&mut body)
                .await?;
            if body.contains("junk") {
                return Err(TransformError::Failed {
                    status: "exit status: 2".into(),
                    diagnostics: "not a PDF file".into(),
                });
            }
            sink.write_all(body.to_uppercase().as_bytes()).await?;
            Ok(Diagnostics::default())
        }
    }

    fn linearizer() -> Linearizer {
        Linearizer::new(Arc::new(Upper))
    }

    #[test]
    fn plan_for_each_batch_size() {
        let config = LinearizeConfig::default();
        assert!(matches!(
            plan_response(&[], &config),
            Err(LinearizeError::NoInputs)
        ));

        let one = vec![Input::from_bytes("report.pdf", &b"x"[..])];
        assert_eq!(
            plan_response(&one, &config).unwrap(),
            ResponseShape::Single {
                filename: "report.pdf".into()
            }
        );

        let two = vec![
            Input::from_bytes("a.pdf", &b"x"[..]),
            Input::from_bytes("b.pdf", &b"y"[..]),
        ];
        let shape = plan_response(&two, &config).unwrap();
        assert_eq!(shape.filename(), "linearized_files.zip");
        assert_eq!(shape.content_type(), "application/zip");
    }

    #[tokio::test]
    async fn single_streams_exact_bytes() {
        let mut sink = Vec::new();
        linearize_single(
            &linearizer(),
            &Input::from_bytes("a.pdf", &b"%pdf-one"[..]),
            &mut sink,
        )
        .await
        .unwrap();
        assert_eq!(sink, b"%PDF-ONE");
    }

    #[tokio::test]
    async fn single_failure_is_request_level() {
        let mut sink = Vec::new();
        let err = linearize_single(
            &linearizer(),
            &Input::from_bytes("a.pdf", &b"junk"[..]),
            &mut sink,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LinearizeError::Transform { ref name, .. } if name == "a.pdf"));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let mut sink = Vec::new();
        let err = linearize_batch(&linearizer(), Vec::new(), &mut sink, &LinearizeConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LinearizeError::NoInputs));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn batch_reports_m_of_n() {
        let inputs = vec![
            Input::from_bytes("a.pdf", &b"one"[..]),
            Input::from_bytes("b.pdf", &b"junk"[..]),
            Input::from_bytes("c.pdf", &b"three"[..]),
        ];
        let mut sink = Vec::new();
        let summary = linearize_batch(&linearizer(), inputs, &mut sink, &LinearizeConfig::default())
            .await
            .unwrap();
        assert_eq!((summary.succeeded, summary.total), (2, 3));

        let zip = zip::ZipArchive::new(std::io::Cursor::new(sink)).unwrap();
        assert_eq!(zip.len(), 2);
    }

    #[tokio::test]
    async fn to_file_single_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();

        let config = LinearizeConfig::builder()
            .qpdf_path("/nonexistent/qpdf")
            .build()
            .unwrap();

        // The real qpdf path is bogus: the single-file run must fail and
        // leave neither the output nor its temp file behind.
        let out = dir.path().join("out/single.pdf");
        let err = linearize_to_file(&[a.clone()], &out, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, LinearizeError::Transform { .. }));
        assert!(!out.exists());
        assert!(!out.with_extension("pdf.tmp").exists());

        // Several inputs still produce a (valid, empty) archive.
        let out = dir.path().join("out/all.zip");
        let summary = linearize_to_file(&[a, b], &out, &config).await.unwrap();
        assert_eq!((summary.succeeded, summary.total), (0, 2));
        let zip = zip::ZipArchive::new(std::fs::File::open(&out).unwrap()).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
