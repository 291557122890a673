// ABOUTME: Custom error types for the batch runner
// ABOUTME: Per-job failures live on the job record; these cover misuse and bad input

use std::fmt;

use crate::scheduler::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    Busy,
    Validation(String),
    DuplicateJobId(JobId),
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunnerError::Busy => write!(
                f,
                "Runner busy: a run is already active. Wait for it to finish or stop it first"
            ),
            RunnerError::Validation(msg) => write!(f, "Validation error: {}", msg),
            RunnerError::DuplicateJobId(id) => {
                write!(f, "Validation error: job id {} appears more than once", id)
            }
        }
    }
}

impl std::error::Error for RunnerError {}

pub type Result<T> = std::result::Result<T, RunnerError>;
