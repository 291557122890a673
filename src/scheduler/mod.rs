// ABOUTME: Batch scheduling: job records, row partitioning, the job store and the runner
// ABOUTME: The runner is the only component that mutates job state during a run

pub mod job;
pub mod partition;
pub mod runner;
pub mod store;

pub use job::{Job, JobDescriptor, JobId, JobStatus};
pub use partition::{partition_rows, RowRange};
pub use runner::{Runner, RunnerConfig, StopPolicy, DEFAULT_MAX_RUNNING_JOBS};
pub use store::JobStore;
