//! Job Dispatcher: a fixed pool of workers draining a pre-filled job queue.
//!
//! ```text
//!            ┌──────────┐   ┌────────┐
//!  inputs ──▶│ job queue│──▶│worker 1│──┐
//!            │(cap = N) │──▶│worker 2│──┼──▶ result channel ──▶ ResultStream
//!            └──────────┘──▶│worker K│──┘     (cap = N)
//!                           └────────┘
//! ```
//!
//! All N jobs are enqueued before any worker starts, and both channels are
//! sized to hold the whole batch, so neither the producer nor a worker ever
//! blocks on a send. Each job produces exactly one [`JobResult`], including
//! when the transform panics. A supervisor task holds the last result
//! sender and drops it only after every worker has returned; that is the
//! single point where the result stream ends.

use crate::error::JobError;
use crate::pipeline::adapter::Linearizer;
use crate::pipeline::artifact::Artifact;
use crate::pipeline::input::Input;
use crate::progress::ProgressCallback;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_stream::Stream;
use tracing::{debug, error, info};

/// One unit of work: an input and its submission position.
#[derive(Debug)]
pub struct Job {
    pub index: usize,
    pub input: Input,
}

/// Outcome of exactly one [`Job`].
///
/// A successful outcome owns its [`Artifact`]; dropping the result deletes
/// the file.
#[derive(Debug)]
pub struct JobResult {
    /// Submission position of the input (0-based).
    pub index: usize,
    /// Display name of the input.
    pub name: String,
    pub outcome: Result<Artifact, JobError>,
}

/// Results in completion order. Ends once every worker has finished.
pub struct ResultStream {
    rx: mpsc::Receiver<JobResult>,
    total: usize,
}

impl ResultStream {
    #[cfg(test)]
    pub(crate) fn from_receiver(rx: mpsc::Receiver<JobResult>, total: usize) -> Self {
        Self { rx, total }
    }

    /// Number of jobs in the batch (= number of results that will arrive).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Wait for the next finished job; `None` once the stream has ended.
    pub async fn next_result(&mut self) -> Option<JobResult> {
        self.rx.recv().await
    }
}

impl Stream for ResultStream {
    type Item = JobResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start `concurrency` workers over `inputs` and return their results as a stream.
///
/// Must be called inside a Tokio runtime.
pub fn dispatch(
    linearizer: Linearizer,
    inputs: Vec<Input>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> ResultStream {
    let total = inputs.len();
    let capacity = total.max(1);
    let (job_tx, job_rx) = mpsc::channel::<Job>(capacity);
    let (result_tx, result_rx) = mpsc::channel::<JobResult>(capacity);

    for (index, input) in inputs.into_iter().enumerate() {
        if let Err(e) = job_tx.try_send(Job { index, input }) {
            // Unreachable with capacity >= total and the receiver alive.
            error!("Job queue rejected input #{}: {}", index, e);
        }
    }
    drop(job_tx);

    let workers_count = concurrency.max(1).min(capacity);
    info!("Dispatching {} jobs across {} workers", total, workers_count);

    let job_rx = Arc::new(Mutex::new(job_rx));
    let mut workers = JoinSet::new();
    for worker_id in 0..workers_count {
        workers.spawn(worker_loop(
            worker_id,
            Arc::clone(&job_rx),
            result_tx.clone(),
            linearizer.clone(),
            progress.clone(),
        ));
    }

    tokio::spawn(async move {
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
        drop(result_tx);
        debug!("All workers finished; result stream closed");
    });

    ResultStream {
        rx: result_rx,
        total,
    }
}

async fn worker_loop(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    linearizer: Linearizer,
    progress: Option<ProgressCallback>,
) {
    loop {
        if results.is_closed() {
            debug!("Worker {}: result stream dropped, stopping", worker_id);
            break;
        }

        let job = jobs.lock().await.recv().await;
        let Some(Job { index, input }) = job else {
            break;
        };
        let name = input.name().to_string();
        debug!("Worker {}: '{}' (#{})", worker_id, name, index);
        if let Some(ref cb) = progress {
            cb.on_job_start(&name);
        }

        let outcome = AssertUnwindSafe(linearizer.run_to_artifact(&input))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(JobError::Panicked {
                    name: name.clone(),
                    detail: panic_message(panic.as_ref()),
                })
            });

        let result = JobResult {
            index,
            name,
            outcome,
        };
        if let Err(undelivered) = results.send(result).await {
            // Dropping the undelivered result deletes its artifact.
            debug!(
                "Worker {}: '{}' finished after the result stream closed",
                worker_id, undelivered.0.name
            );
            break;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
