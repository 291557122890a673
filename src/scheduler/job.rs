// ABOUTME: Job records tracked by the runner for a single run
// ABOUTME: Serialized to JSON and echoed back (annotated) by the remote side

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a job, unique within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    /// Terminal jobs never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of schedulable work.
///
/// The caller-defined payload is flattened into the same JSON object as the
/// tracking fields, so the remote side sees `{ "id": 0, "startRow": 2, ... }`
/// and may add `startedAt`, `endedAt` and `error` before echoing it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job<P> {
    pub id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Job<P> {
    pub fn new(id: JobId, payload: P) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
            payload,
        }
    }

    /// Time spent on the remote side, for the elapsed column of a progress table.
    ///
    /// While the job is still running only `started_at` is known, so the
    /// elapsed time is measured against now.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        let ended = self.ended_at.unwrap_or_else(Utc::now);
        Some(ended - started)
    }
}

/// Input to a run: a payload with an optional pre-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor<P> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JobId>,
    pub payload: P,
}

impl<P> JobDescriptor<P> {
    pub fn new(payload: P) -> Self {
        Self { id: None, payload }
    }

    pub fn with_id(id: JobId, payload: P) -> Self {
        Self {
            id: Some(id),
            payload,
        }
    }
}

impl<P> From<Job<P>> for JobDescriptor<P> {
    fn from(job: Job<P>) -> Self {
        Self::with_id(job.id, job.payload)
    }
}
