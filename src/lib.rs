// ABOUTME: Library root for the ad copy batch runner
// ABOUTME: Exposes the scheduler, the remote invoker, configuration and reporting helpers

pub mod config;
pub mod error;
pub mod remote;
pub mod report;
pub mod scheduler;

pub use error::RunnerError;
pub use scheduler::{Job, JobDescriptor, JobId, JobStatus, Runner, RunnerConfig, StopPolicy};
