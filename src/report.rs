//! Export progress and outcome reporting.
//!
//! Reports observable progress while an export drains its fetch tasks, and
//! the final outcome after the archive is finalized. Progress is emitted on
//! **stderr** so stdout stays parseable for scripts. Reporting is strictly
//! observational: nothing here influences the pipeline's control flow.

use std::io::Write;

use crate::fetch::FetchError;

/// Aggregate result of one export run. Built incrementally as tasks
/// settle, read once for the summary.
#[derive(Debug, Default)]
pub struct ExportOutcome {
    /// Fetch tasks handed to the executor.
    pub attempted: u64,
    /// Tasks fetched and appended to the archive.
    pub succeeded: u64,
    /// Tasks that exhausted retries or whose payload could not be copied.
    pub failed: u64,
    /// (source locator, failure reason) per failed task.
    pub failures: Vec<(String, FetchError)>,
}

/// A single progress event for an export run.
#[derive(Clone, Debug)]
pub enum ExportEvent {
    /// Selection and planning finished; fetching is about to start.
    Planned { records: u64, tasks: u64 },
    /// One task settled (success or failure): n of total done.
    Fetching { n: u64, total: u64 },
    /// One task failed terminally.
    TaskFailed { locator: String, reason: String },
    /// The archive was finalized.
    Completed {
        attempted: u64,
        succeeded: u64,
        failed: u64,
        cutoff: Option<String>,
    },
}

/// Reports export progress. Implementations write to stderr (human or
/// JSON).
pub trait ExportReporter: Send + Sync {
    fn report(&self, event: ExportEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl ExportReporter for StderrProgress {
    fn report(&self, event: ExportEvent) {
        let line = match &event {
            ExportEvent::Planned { records, tasks } => {
                format!("export  {} records, {} attachments to fetch\n", records, tasks)
            }
            ExportEvent::Fetching { n, total } => {
                format!("export  fetching  {} / {}\n", n, total)
            }
            ExportEvent::TaskFailed { locator, reason } => {
                format!("export  failed  {} ({})\n", locator, reason)
            }
            ExportEvent::Completed {
                attempted,
                succeeded,
                failed,
                cutoff,
            } => format!(
                "export  done  {} attempted, {} archived, {} failed (cutoff: {})\n",
                attempted,
                succeeded,
                failed,
                cutoff.as_deref().unwrap_or("none")
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ExportReporter for JsonProgress {
    fn report(&self, event: ExportEvent) {
        let obj = match &event {
            ExportEvent::Planned { records, tasks } => serde_json::json!({
                "event": "planned",
                "records": records,
                "tasks": tasks
            }),
            ExportEvent::Fetching { n, total } => serde_json::json!({
                "event": "fetching",
                "n": n,
                "total": total
            }),
            ExportEvent::TaskFailed { locator, reason } => serde_json::json!({
                "event": "task_failed",
                "locator": locator,
                "reason": reason
            }),
            ExportEvent::Completed {
                attempted,
                succeeded,
                failed,
                cutoff,
            } => serde_json::json!({
                "event": "completed",
                "attempted": attempted,
                "succeeded": succeeded,
                "failed": failed,
                "cutoff": cutoff
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ExportReporter for NoProgress {
    fn report(&self, _event: ExportEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ExportReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
