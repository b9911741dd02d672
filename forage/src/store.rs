//! In-memory job store.
//!
//! The store owns every [`Job`] record for the life of the process. Records
//! are never removed; callers receive cloned snapshots and mutate through
//! [`JobStore::update`] while the single store lock is held.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::job::{Job, JobId, JobSpec, JobStatus};

/// Per-status job counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    fn bump(&mut self, status: JobStatus) {
        let slot = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Cancelled => &mut self.cancelled,
        };
        *slot += 1;
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    jobs: HashMap<JobId, Job>,
    next_sequence: u64,
}

/// Concurrent map of job id to job record, guarded by one lock.
#[derive(Debug, Default)]
pub struct JobStore {
    inner: Mutex<StoreInner>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `Pending` job and return its snapshot.
    pub fn create(&self, spec: JobSpec) -> Job {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let job = Job::new(spec, sequence);
        inner.jobs.insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.inner.lock().jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest-created first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        self.page(status, 0, limit).0
    }

    /// One page of the newest-first listing plus the total number of matches.
    pub fn page(
        &self,
        status: Option<JobStatus>,
        offset: usize,
        limit: usize,
    ) -> (Vec<Job>, usize) {
        let mut matching: Vec<Job> = {
            let inner = self.inner.lock();
            inner
                .jobs
                .values()
                .filter(|job| status.map_or(true, |s| job.status == s))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(limit).collect();
        (page, total)
    }

    /// Mutate one job under the store lock.
    ///
    /// The closure must be a short in-memory update; never await or run
    /// delegate work inside it.
    pub fn update<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> T,
    ) -> Result<T, JobError> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        Ok(f(job))
    }

    /// Like [`JobStore::update`], for closures that can themselves fail.
    pub fn try_update<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        self.update(id, f)?
    }

    pub fn counts(&self) -> StatusCounts {
        let inner = self.inner.lock();
        let mut counts = StatusCounts::default();
        for job in inner.jobs.values() {
            counts.bump(job.status);
        }
        counts
    }
}
