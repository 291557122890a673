// ABOUTME: Batched job runner with bounded concurrency
// ABOUTME: Admits jobs FIFO, dispatches them through an invoker, resolves once all are terminal

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::job::{Job, JobDescriptor, JobId, JobStatus};
use super::store::JobStore;
use crate::error::{Result, RunnerError};
use crate::remote::Invoker;

pub const DEFAULT_MAX_RUNNING_JOBS: usize = 3;

/// What `stop()` does with jobs whose remote call is already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPolicy {
    /// Let in-flight jobs settle with their own outcome.
    #[default]
    Drain,
    /// Mark in-flight jobs cancelled at once and ignore their late results.
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Upper bound on simultaneously running jobs.
    pub max_running_jobs: usize,
    /// Log every job transition at info level instead of debug.
    pub tracing: bool,
    pub stop_policy: StopPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_running_jobs: DEFAULT_MAX_RUNNING_JOBS,
            tracing: false,
            stop_policy: StopPolicy::Drain,
        }
    }
}

enum RunnerEvent {
    Settled {
        id: JobId,
        outcome: std::result::Result<String, String>,
    },
    Stop,
}

type EventSender = mpsc::UnboundedSender<RunnerEvent>;

/// Handle to the active run, shared with `stop()`.
struct RunHandle {
    events: EventSender,
    stop_requested: Arc<AtomicBool>,
}

/// Runs batches of jobs against a remote invoker.
///
/// At most one run is active at a time. The `run()` future is the only place
/// job state changes: remote calls are spawned as detached tasks and report
/// back over a channel, so settlements are applied one at a time.
pub struct Runner<I> {
    invoker: Arc<I>,
    config: RunnerConfig,
    active: Mutex<Option<RunHandle>>,
}

/// Clears the active-run slot when a run finishes or its future is dropped.
struct ActiveRun<'a> {
    slot: &'a Mutex<Option<RunHandle>>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl<I: Invoker + 'static> Runner<I> {
    pub fn new(invoker: Arc<I>, config: RunnerConfig) -> Self {
        Self {
            invoker,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// True while a run is in progress.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancel every job that has not reached a terminal state.
    ///
    /// Pending jobs become `Cancelled` right away. Running jobs follow the
    /// configured [`StopPolicy`]; their remote calls are never aborted.
    /// Calling this while idle, or more than once, does nothing further.
    pub fn stop(&self) {
        let slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.as_ref() {
            // The flag is seen before any further admission; the event wakes the run loop.
            if handle.stop_requested.swap(true, Ordering::SeqCst) {
                return;
            }
            tracing::info!("Stop requested, cancelling outstanding jobs");
            let _ = handle.events.send(RunnerEvent::Stop);
        }
    }

    /// Execute `command` once per descriptor and wait for every job to finish.
    ///
    /// `on_progress` sees the full job record after every transition. Per-job
    /// failures are recorded on the returned jobs; the call itself only fails
    /// when a run is already active or the descriptors are invalid.
    pub async fn run<P, F>(
        &self,
        command: &str,
        descriptors: Vec<JobDescriptor<P>>,
        mut on_progress: F,
    ) -> Result<Vec<Job<P>>>
    where
        P: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut(&Job<P>) + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stop_requested = Arc::new(AtomicBool::new(false));
        let _active = self.activate(RunHandle {
            events: tx.clone(),
            stop_requested: Arc::clone(&stop_requested),
        })?;

        if self.config.max_running_jobs == 0 {
            return Err(RunnerError::Validation(
                "max running jobs must be at least 1".to_string(),
            ));
        }

        let mut store = JobStore::from_descriptors(descriptors)?;
        let command: Arc<str> = Arc::from(command);

        tracing::info!(
            command = %command,
            jobs = store.len(),
            max_running = self.config.max_running_jobs,
            "Starting run"
        );

        let mut cancelled = false;
        loop {
            if !cancelled && stop_requested.load(Ordering::SeqCst) {
                self.cancel(&mut store, &mut on_progress);
                cancelled = true;
            }
            self.admit(&mut store, &command, &tx, &stop_requested, &mut on_progress);
            if !store.has_outstanding() {
                break;
            }

            // `tx` is held here, so the channel never closes mid-run.
            let Some(event) = rx.recv().await else {
                break;
            };
            match event {
                RunnerEvent::Settled { id, outcome } => {
                    self.settle(&mut store, id, outcome, &mut on_progress)
                }
                // Applied at the top of the loop, before anything else is admitted.
                RunnerEvent::Stop => {}
            }
        }

        let jobs = store.into_jobs();
        tracing::info!(
            command = %command,
            complete = count(&jobs, JobStatus::Complete),
            error = count(&jobs, JobStatus::Error),
            cancelled = count(&jobs, JobStatus::Cancelled),
            "Run finished"
        );
        Ok(jobs)
    }

    fn activate(&self, handle: RunHandle) -> Result<ActiveRun<'_>> {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::warn!("Rejected run: another run is still active");
            return Err(RunnerError::Busy);
        }
        *slot = Some(handle);
        Ok(ActiveRun { slot: &self.active })
    }

    fn admit<P, F>(
        &self,
        store: &mut JobStore<P>,
        command: &Arc<str>,
        tx: &EventSender,
        stop_requested: &AtomicBool,
        on_progress: &mut F,
    ) where
        P: Serialize,
        F: FnMut(&Job<P>),
    {
        while store.running_count() < self.config.max_running_jobs {
            if stop_requested.load(Ordering::SeqCst) {
                break;
            }
            let running = store.running_count();
            let Some(job) = store.admit_next() else {
                break;
            };
            self.trace_transition(job, running + 1);
            on_progress(job);
            let id = job.id;

            match serde_json::to_string(job) {
                Ok(body) => self.dispatch(id, Arc::clone(command), body, tx.clone()),
                Err(err) => {
                    let running = store.running_count().saturating_sub(1);
                    if let Some(job) = store.fail(id, format!("Failed to serialize job: {}", err))
                    {
                        self.trace_transition(job, running);
                        on_progress(job);
                    }
                }
            }
        }
    }

    fn dispatch(&self, id: JobId, command: Arc<str>, body: String, tx: EventSender) {
        let invoker = Arc::clone(&self.invoker);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(invoker.invoke(&command, body))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(format!("Remote call for job {} panicked", id)));
            // A closed channel means the run already resolved without this job.
            let _ = tx.send(RunnerEvent::Settled { id, outcome });
        });
    }

    fn settle<P, F>(
        &self,
        store: &mut JobStore<P>,
        id: JobId,
        outcome: std::result::Result<String, String>,
        on_progress: &mut F,
    ) where
        P: DeserializeOwned,
        F: FnMut(&Job<P>),
    {
        let is_open = store
            .get(id)
            .is_some_and(|job| job.status == JobStatus::Running);
        if !is_open {
            tracing::debug!(job_id = %id, "Ignoring late settlement for a finished job");
            return;
        }

        let running = store.running_count() - 1;
        let settled = match outcome {
            Ok(body) => match decode_echo::<P>(id, &body) {
                Ok(record) => store.settle(id, JobStatus::Complete, record),
                Err(reason) => store.fail(id, reason),
            },
            Err(body) => match decode_echo::<P>(id, &body) {
                Ok(mut record) => {
                    record.error.get_or_insert_with(|| "Remote call failed".to_string());
                    store.settle(id, JobStatus::Error, record)
                }
                Err(_) => store.fail(id, error_message(body)),
            },
        };

        if let Some(job) = settled {
            if job.status == JobStatus::Error {
                tracing::warn!(
                    job_id = %job.id,
                    error = job.error.as_deref().unwrap_or_default(),
                    "Job failed"
                );
            }
            self.trace_transition(job, running);
            on_progress(job);
        }
    }

    fn cancel<P, F>(&self, store: &mut JobStore<P>, on_progress: &mut F)
    where
        F: FnMut(&Job<P>),
    {
        let include_running = self.config.stop_policy == StopPolicy::Abandon;
        for id in store.cancel(include_running) {
            if let Some(job) = store.get(id) {
                self.trace_transition(job, store.running_count());
                on_progress(job);
            }
        }
    }

    fn trace_transition<P>(&self, job: &Job<P>, running: usize) {
        if self.config.tracing {
            tracing::info!(job_id = %job.id, status = %job.status, running, "Job transition");
        } else {
            tracing::debug!(job_id = %job.id, status = %job.status, running, "Job transition");
        }
    }
}

/// Parse the job echoed by the remote side and check it is the one dispatched.
fn decode_echo<P: DeserializeOwned>(id: JobId, body: &str) -> std::result::Result<Job<P>, String> {
    let record: Job<P> =
        serde_json::from_str(body).map_err(|err| format!("Malformed response: {}", err))?;
    if record.id != id {
        return Err(format!(
            "Remote side echoed job id {} for job {}",
            record.id, id
        ));
    }
    Ok(record)
}

/// Pull the `error` field out of an error payload, falling back to the raw body.
fn error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or(body)
}

fn count<P>(jobs: &[Job<P>], status: JobStatus) -> usize {
    jobs.iter().filter(|job| job.status == status).count()
}
