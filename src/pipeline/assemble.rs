//! Archive Assembler: the single consumer of a [`ResultStream`].
//!
//! Results are taken in arrival order, so the archive lists documents in the
//! order they finished, not the order they were submitted. Each successful
//! artifact is re-verified, copied into the ZIP and flushed before the next
//! result is looked at; failed jobs are logged and leave no entry.
//!
//! The assembler owns every artifact it receives. All of them are deleted
//! before it returns, whether the archive was finalised, the sink broke, or
//! the future itself was dropped.

use crate::archive::ZipStreamWriter;
use crate::error::LinearizeError;
use crate::output::{BatchSummary, JobReport};
use crate::pipeline::artifact::Artifact;
use crate::pipeline::dispatch::{JobResult, ResultStream};
use crate::progress::ProgressCallback;
use std::io;
use std::time::Instant;
use tokio::io::AsyncWrite;
use tracing::{debug, error, info, warn};

/// Where the sink gave out.
enum SinkFailure {
    /// While an entry was being copied; the archive is truncated.
    MidEntry(io::Error),
    /// On the flush after a complete entry.
    Flush(io::Error),
}

/// Drain `results` into a ZIP archive written to `sink`.
///
/// Returns [`LinearizeError::ArchiveWrite`] if the sink fails. A failure in
/// the middle of an entry leaves the archive truncated; a failed flush still
/// gets the central directory written before the first error is returned.
/// Per-document failures are reported in the summary, never as an error.
pub async fn assemble<W>(
    mut results: ResultStream,
    sink: &mut W,
    progress: Option<ProgressCallback>,
) -> Result<BatchSummary, LinearizeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let started = Instant::now();
    let total = results.total();
    let mut zip = ZipStreamWriter::new(sink);
    let mut owned: Vec<Artifact> = Vec::with_capacity(total);
    let mut reports: Vec<JobReport> = Vec::with_capacity(total);
    let mut failure = None;

    while let Some(JobResult {
        index,
        name,
        outcome,
    }) = results.next_result().await
    {
        let artifact = match outcome {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Skipping '{}': {}", name, e);
                if let Some(ref cb) = progress {
                    cb.on_job_error(&name, e.to_string());
                }
                reports.push(JobReport {
                    index,
                    name,
                    bytes: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let opened = match artifact.verified_len().await {
            Some(_) => tokio::fs::File::open(artifact.path()).await.map_err(|e| e.to_string()),
            None => Err("output vanished or was empty before it could be archived".to_string()),
        };
        let mut file = match opened {
            Ok(file) => file,
            Err(reason) => {
                error!("Skipping '{}': {}", name, reason);
                if let Some(ref cb) = progress {
                    cb.on_job_error(&name, reason.clone());
                }
                reports.push(JobReport {
                    index,
                    name,
                    bytes: None,
                    error: Some(reason),
                });
                owned.push(artifact);
                continue;
            }
        };
        owned.push(artifact);

        let bytes = match zip.append(&name, &mut file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Archive output failed while writing '{}': {}", name, e);
                failure = Some(SinkFailure::MidEntry(e));
                break;
            }
        };
        debug!("Archived '{}' ({} bytes)", name, bytes);
        if let Some(ref cb) = progress {
            cb.on_job_complete(&name, bytes);
        }
        reports.push(JobReport {
            index,
            name,
            bytes: Some(bytes),
            error: None,
        });
        if let Err(e) = zip.flush().await {
            warn!("Archive output failed to flush: {}", e);
            failure = Some(SinkFailure::Flush(e));
            break;
        }
    }

    // Stop idle workers early; anything still in flight is deleted on delivery.
    drop(results);

    // A half-written entry cannot be followed by a central directory. After a
    // failed flush every entry is whole, so the archive is still closed.
    let finished = match failure {
        Some(SinkFailure::MidEntry(e)) => Err(e),
        Some(SinkFailure::Flush(e)) => {
            if let Err(late) = zip.finish().await {
                debug!("Finalising after flush failure also failed: {}", late);
            }
            Err(e)
        }
        None => zip.finish().await.map(|_| ()),
    }
    .map_err(|e| LinearizeError::ArchiveWrite { source: e });

    for artifact in &mut owned {
        let _ = artifact.discard();
    }
    drop(owned);

    let succeeded = reports.iter().filter(|r| r.succeeded()).count();
    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, succeeded);
    }
    finished?;

    let summary = BatchSummary {
        succeeded,
        total,
        reports,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Archive complete: {}/{} documents in {}ms",
        summary.succeeded, summary.total, summary.duration_ms
    );
    Ok(summary)
}
