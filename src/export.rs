//! Archive export pipeline orchestration.
//!
//! Coordinates the full export flow: selection → task planning → bounded
//! concurrent fetching → serialized archive writing. Fetches fan out over
//! a fixed-size worker pool; settled tasks flow through a bounded channel
//! into a single consumer that exclusively owns the [`ArchiveWriter`], so
//! the container never sees concurrent appends.
//!
//! Per-task fetch failures are steady-state: they are counted, logged, and
//! excluded from the archive without disturbing sibling tasks. Only faults
//! of the container itself, the record store, or the worker pool abort an
//! export.

use std::collections::VecDeque;
use std::io::{Seek, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::archive::{AppendError, ArchiveWriter};
use crate::config::Config;
use crate::fetch::{Fetch, FetchError, Payload};
use crate::plan::{self, FetchTask};
use crate::report::{ExportEvent, ExportOutcome, ExportReporter};
use crate::select::{self, ExportRequest};

/// How an export run can fail as a whole. Per-task fetch failures are not
/// represented here — they land in [`ExportOutcome::failures`].
#[derive(Debug)]
pub enum ExportError {
    /// No record matched the request's identity filter. Raised before any
    /// fetch or archive I/O.
    NotFound,
    /// The archive container failed to accept entries or finalize.
    Writer(anyhow::Error),
    /// A worker task died without settling its queue share.
    Internal(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::NotFound => write!(f, "no matching records"),
            ExportError::Writer(e) => write!(f, "archive error: {}", e),
            ExportError::Internal(msg) => write!(f, "export failed: {}", msg),
        }
    }
}

impl std::error::Error for ExportError {}

/// Run the export pipeline, writing the archive into `sink`.
///
/// Returns the finalized sink (positioned at end-of-archive) together
/// with the run's outcome counters.
pub async fn run_export<W: Write + Seek>(
    config: &Config,
    request: &ExportRequest,
    fetcher: Arc<dyn Fetch>,
    sink: W,
    reporter: &dyn ExportReporter,
) -> Result<(W, ExportOutcome), ExportError> {
    let records = select::resolve_records(config, request);
    if records.is_empty() {
        return Err(ExportError::NotFound);
    }

    let tasks = plan::plan_tasks(&records, config);
    reporter.report(ExportEvent::Planned {
        records: records.len() as u64,
        tasks: tasks.len() as u64,
    });

    let mut writer = ArchiveWriter::new(sink);
    let outcome = drain_tasks(config.export.workers, tasks, fetcher, &mut writer, reporter).await?;
    let sink = writer.finalize().map_err(ExportError::Writer)?;

    reporter.report(ExportEvent::Completed {
        attempted: outcome.attempted,
        succeeded: outcome.succeeded,
        failed: outcome.failed,
        cutoff: request.cutoff.map(|c| c.to_rfc3339()),
    });

    Ok((sink, outcome))
}

/// One task's terminal result, produced by a worker.
struct Settled {
    task: FetchTask,
    result: Result<Payload, FetchError>,
}

/// Drain all tasks through a pool of `workers` fetchers and append every
/// success to the archive.
///
/// Workers pull from a shared queue and push settled results onto a
/// bounded channel; this function is the channel's only consumer and the
/// writer's only caller. The consumer loop doubles as the join barrier:
/// the channel closes once every worker has finished, so `finalize` can
/// never run before the last append.
async fn drain_tasks<W: Write + Seek>(
    workers: usize,
    tasks: Vec<FetchTask>,
    fetcher: Arc<dyn Fetch>,
    writer: &mut ArchiveWriter<W>,
    reporter: &dyn ExportReporter,
) -> Result<ExportOutcome, ExportError> {
    let total = tasks.len() as u64;
    let mut outcome = ExportOutcome {
        attempted: total,
        ..Default::default()
    };
    if tasks.is_empty() {
        return Ok(outcome);
    }

    let workers = workers.clamp(1, tasks.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
    let (tx, mut rx) = mpsc::channel::<Settled>(workers * 2);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let fetcher = Arc::clone(&fetcher);
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let task = queue.lock().await.pop_front();
                let Some(task) = task else { break };
                let result = fetcher.fetch(&task.locator).await;
                if tx.send(Settled { task, result }).await.is_err() {
                    break;
                }
            }
        }));
    }
    // Consumer-side sender must go, or the drain loop never ends.
    drop(tx);

    let mut done = 0u64;
    while let Some(settled) = rx.recv().await {
        done += 1;
        let locator = settled.task.locator.to_string();
        match settled.result {
            Ok(payload) => {
                match writer.append(payload, &settled.task.archive_path, settled.task.timestamp) {
                    Ok(()) => outcome.succeeded += 1,
                    Err(AppendError::Payload(e)) => {
                        outcome.failed += 1;
                        reporter.report(ExportEvent::TaskFailed {
                            locator: locator.clone(),
                            reason: e.to_string(),
                        });
                        outcome.failures.push((locator, FetchError::Io(e.to_string())));
                    }
                    Err(AppendError::Container(e)) => return Err(ExportError::Writer(e)),
                }
            }
            Err(e) => {
                outcome.failed += 1;
                reporter.report(ExportEvent::TaskFailed {
                    locator: locator.clone(),
                    reason: e.to_string(),
                });
                outcome.failures.push((locator, e));
            }
        }
        reporter.report(ExportEvent::Fetching { n: done, total });
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| ExportError::Internal(format!("fetch worker died: {}", e)))?;
    }

    Ok(outcome)
}
