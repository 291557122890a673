// ABOUTME: Presentation helpers for finished runs
// ABOUTME: Status summaries, the job table, and the JSON results file used for retries

use anyhow::{Context, Result};
use chrono::Duration;
use std::fmt::Write as _;
use std::path::Path;

use crate::remote::BatchPayload;
use crate::scheduler::job::{Job, JobDescriptor, JobStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub complete: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn of<P>(jobs: &[Job<P>]) -> Self {
        let mut summary = Summary {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Complete => summary.complete += 1,
                JobStatus::Error => summary.error += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                JobStatus::Pending | JobStatus::Running => {}
            }
        }
        summary
    }

    /// True when every job completed.
    pub fn is_success(&self) -> bool {
        self.complete == self.total
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} batches: {} complete, {} failed, {} cancelled",
            self.total, self.complete, self.error, self.cancelled
        )
    }
}

pub fn format_elapsed(elapsed: Option<Duration>) -> String {
    let Some(elapsed) = elapsed else {
        return "-".to_string();
    };
    let secs = elapsed.num_seconds().max(0);
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// Render the per-batch table printed after a run.
pub fn render_table(jobs: &[Job<BatchPayload>]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:<13} {:<10} {:<8} ERROR",
        "ID", "ROWS", "STATUS", "ELAPSED"
    );
    for job in jobs {
        let rows = format!("{}-{}", job.payload.start_row, job.payload.end_row);
        let _ = writeln!(
            out,
            "{:<5} {:<13} {:<10} {:<8} {}",
            job.id,
            rows,
            job.status.to_string(),
            format_elapsed(job.elapsed()),
            job.error.as_deref().unwrap_or("")
        );
    }
    out
}

pub fn save_results(path: &Path, jobs: &[Job<BatchPayload>]) -> Result<()> {
    let json = serde_json::to_string_pretty(jobs).context("Failed to serialize results")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results to {}", path.display()))
}

pub fn load_results(path: &Path) -> Result<Vec<Job<BatchPayload>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Results file {} is not a valid job list", path.display()))
}

/// Descriptors for the batches of a previous run that did not complete.
///
/// Ids are kept so the retried batches line up with the original table;
/// annotations from the failed attempt are dropped.
pub fn retry_descriptors(jobs: Vec<Job<BatchPayload>>) -> Vec<JobDescriptor<BatchPayload>> {
    jobs.into_iter()
        .filter(|job| matches!(job.status, JobStatus::Error | JobStatus::Cancelled))
        .map(|job| JobDescriptor::with_id(job.id, BatchPayload::from(job.payload.rows())))
        .collect()
}
