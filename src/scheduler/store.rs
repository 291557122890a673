// ABOUTME: In-memory job store for a single run
// ABOUTME: Owns every job record and enforces the per-job state machine

use std::collections::{HashMap, HashSet, VecDeque};

use super::job::{Job, JobDescriptor, JobId, JobStatus};
use crate::error::{Result, RunnerError};

/// Manages job state for one run.
///
/// Only the runner's event loop holds a `JobStore`, so transitions never race.
#[derive(Debug)]
pub struct JobStore<P> {
    jobs: HashMap<JobId, Job<P>>,
    order: Vec<JobId>,
    pending: VecDeque<JobId>,
    running: usize,
}

impl<P> JobStore<P> {
    /// Build a store from descriptors, assigning ids to those without one.
    ///
    /// Missing ids are filled with the lowest unused ids counting up from 0,
    /// in descriptor order. Every job starts `Pending`.
    pub fn from_descriptors(descriptors: Vec<JobDescriptor<P>>) -> Result<Self> {
        let mut taken = HashSet::new();
        for id in descriptors.iter().filter_map(|d| d.id) {
            if !taken.insert(id) {
                return Err(RunnerError::DuplicateJobId(id));
            }
        }

        let mut jobs = HashMap::with_capacity(descriptors.len());
        let mut order = Vec::with_capacity(descriptors.len());
        let mut next_id = 0u64;

        for descriptor in descriptors {
            let id = match descriptor.id {
                Some(id) => id,
                None => {
                    while taken.contains(&JobId(next_id)) {
                        next_id += 1;
                    }
                    let id = JobId(next_id);
                    taken.insert(id);
                    id
                }
            };
            order.push(id);
            jobs.insert(id, Job::new(id, descriptor.payload));
        }

        Ok(Self {
            jobs,
            pending: order.iter().copied().collect(),
            order,
            running: 0,
        })
    }

    pub fn get(&self, id: JobId) -> Option<&Job<P>> {
        self.jobs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// True while any job is still `Pending` or `Running`.
    pub fn has_outstanding(&self) -> bool {
        !self.pending.is_empty() || self.running > 0
    }

    /// Pop the oldest pending job and mark it `Running`.
    pub fn admit_next(&mut self) -> Option<&Job<P>> {
        let id = self.pending.pop_front()?;
        let job = self.jobs.get_mut(&id)?;
        job.status = JobStatus::Running;
        self.running += 1;
        Some(job)
    }

    /// Apply the outcome of a dispatched job.
    ///
    /// `record` replaces the stored job (keeping the store's id) and the job
    /// moves to `status`. Returns `None` when the job is unknown or no longer
    /// `Running`, in which case nothing changes.
    pub fn settle(&mut self, id: JobId, status: JobStatus, record: Job<P>) -> Option<&Job<P>> {
        debug_assert!(matches!(status, JobStatus::Complete | JobStatus::Error));
        let job = self.jobs.get_mut(&id)?;
        if job.status != JobStatus::Running {
            return None;
        }
        *job = record;
        job.id = id;
        job.status = status;
        self.running -= 1;
        Some(job)
    }

    /// Mark a running job `Error` without a replacement record.
    pub fn fail(&mut self, id: JobId, error: String) -> Option<&Job<P>> {
        let job = self.jobs.get_mut(&id)?;
        if job.status != JobStatus::Running {
            return None;
        }
        job.status = JobStatus::Error;
        job.error = Some(error);
        self.running -= 1;
        Some(job)
    }

    /// Cancel every pending job, and running ones too when `include_running`.
    ///
    /// Returns the ids that changed, in descriptor order.
    pub fn cancel(&mut self, include_running: bool) -> Vec<JobId> {
        let mut cancelled = Vec::new();
        self.pending.clear();
        for id in &self.order {
            let Some(job) = self.jobs.get_mut(id) else {
                continue;
            };
            match job.status {
                JobStatus::Pending => {}
                JobStatus::Running if include_running => self.running -= 1,
                _ => continue,
            }
            job.status = JobStatus::Cancelled;
            cancelled.push(*id);
        }
        cancelled
    }

    /// Consume the store, yielding final records in descriptor order.
    pub fn into_jobs(mut self) -> Vec<Job<P>> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::partition::{partition_rows, RowRange};

    fn store(count: u32) -> JobStore<RowRange> {
        JobStore::from_descriptors(partition_rows(1, count, 1).unwrap()).unwrap()
    }

    #[test]
    fn test_assigns_missing_ids_sequentially() {
        let descriptors = vec![
            JobDescriptor::new("a"),
            JobDescriptor::with_id(JobId(1), "b"),
            JobDescriptor::new("c"),
            JobDescriptor::new("d"),
        ];
        let store = JobStore::from_descriptors(descriptors).unwrap();
        let jobs = store.into_jobs();
        let ids: Vec<u64> = jobs.iter().map(|j| j.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(jobs[2].payload, "c");
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let descriptors = vec![
            JobDescriptor::with_id(JobId(4), "a"),
            JobDescriptor::with_id(JobId(4), "b"),
        ];
        let err = JobStore::from_descriptors(descriptors).unwrap_err();
        assert_eq!(err, RunnerError::DuplicateJobId(JobId(4)));
    }

    #[test]
    fn test_admission_is_fifo() {
        let mut store = store(3);
        assert_eq!(store.admit_next().unwrap().id, JobId(0));
        assert_eq!(store.admit_next().unwrap().id, JobId(1));
        assert_eq!(store.running_count(), 2);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.admit_next().unwrap().id, JobId(2));
        assert!(store.admit_next().is_none());
    }

    #[test]
    fn test_settle_replaces_record() {
        let mut store = store(2);
        store.admit_next();

        let mut echoed = Job::new(JobId(0), RowRange::new(1, 1));
        echoed.error = Some("partial".to_string());
        let job = store.settle(JobId(0), JobStatus::Error, echoed).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("partial"));
        assert_eq!(store.running_count(), 0);
        assert!(store.has_outstanding());
    }

    #[test]
    fn test_settle_ignores_non_running_jobs() {
        let mut store = store(2);
        let record = Job::new(JobId(1), RowRange::new(2, 2));
        // still pending
        assert!(store.settle(JobId(1), JobStatus::Complete, record.clone()).is_none());
        // unknown id
        assert!(store.settle(JobId(99), JobStatus::Complete, record).is_none());
        assert_eq!(store.get(JobId(1)).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_cancel_pending_only() {
        let mut store = store(4);
        store.admit_next();
        store.admit_next();

        let cancelled = store.cancel(false);
        assert_eq!(cancelled, vec![JobId(2), JobId(3)]);
        assert_eq!(store.running_count(), 2);
        assert!(store.admit_next().is_none());
        assert!(store.has_outstanding());

        let done = Job::new(JobId(0), RowRange::new(1, 1));
        assert!(store.settle(JobId(0), JobStatus::Complete, done).is_some());
        assert!(store.fail(JobId(1), "boom".to_string()).is_some());
        assert!(!store.has_outstanding());
    }

    #[test]
    fn test_cancel_including_running_blocks_late_settlement() {
        let mut store = store(2);
        store.admit_next();

        let cancelled = store.cancel(true);
        assert_eq!(cancelled, vec![JobId(0), JobId(1)]);
        assert!(!store.has_outstanding());

        let late = Job::new(JobId(0), RowRange::new(1, 1));
        assert!(store.settle(JobId(0), JobStatus::Complete, late).is_none());
        assert!(store.fail(JobId(0), "late".to_string()).is_none());
        assert_eq!(store.get(JobId(0)).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut store = store(2);
        assert_eq!(store.cancel(true).len(), 2);
        assert!(store.cancel(true).is_empty());
    }
}
