//! The job manager facade.
//!
//! A [`JobManager`] composes the store, priority queue, dispatcher, event bus
//! and worker pool. It is constructed explicitly (see
//! [`JobManagerBuilder`](crate::JobManagerBuilder)) and shared behind an
//! `Arc`; nothing in the crate is a process-global.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::api::{JobListResponse, JobRequest, JobResponse, JobStats, ListQuery};
use crate::config::ManagerConfig;
use crate::dispatch::Dispatcher;
use crate::error::JobError;
use crate::events::{InProcEventBus, JobEvent, JobEventPayload};
use crate::job::{Job, JobId, JobStatus};
use crate::queue::{QueueSnapshot, TicketQueue};
use crate::runtime::supervisor::WorkerPool;
use crate::runtime::worker::{WorkerConfig, WorkerContext};
use crate::search::{SearchExecutor, SearchRequest};
use crate::store::JobStore;
use crate::telemetry;

pub struct JobManager {
    config: ManagerConfig,
    store: Arc<JobStore>,
    queue: Arc<dyn TicketQueue>,
    events: Arc<InProcEventBus>,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
    started: AtomicBool,
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobManager")
            .field("config", &self.config)
            .field("jobs", &self.store.len())
            .field("queue_depth", &self.queue.depth())
            .field("dispatcher", &self.dispatcher)
            .field("pool", &self.pool)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl JobManager {
    pub(crate) fn new(
        config: ManagerConfig,
        search: Arc<dyn SearchExecutor>,
        queue: Arc<dyn TicketQueue>,
        events: Arc<InProcEventBus>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            search,
            config.blocking_permits(),
            config.health_check_delay(),
        );
        Self {
            pool: WorkerPool::new(config.shutdown_timeout()),
            config,
            store: Arc::new(JobStore::new()),
            queue,
            events,
            dispatcher: Arc::new(dispatcher),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Launch the worker pool. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Fails once the manager has been shut down.
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.pool.shutdown_token().is_cancelled() {
            anyhow::bail!("job manager has been shut down");
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let context = Arc::new(WorkerContext {
            store: Arc::clone(&self.store),
            queue: Arc::clone(&self.queue),
            dispatcher: Arc::clone(&self.dispatcher),
            events: Arc::clone(&self.events),
            retry: self.config.retry_policy(),
            enforce_timeouts: self.config.enforce_timeouts,
        });
        let configs = (0..self.config.workers).map(|i| {
            WorkerConfig::new(format!("worker-{i}"))
                .with_poll_interval(self.config.poll_interval_ms)
                .with_error_backoff(self.config.error_backoff_ms)
        });
        self.pool.spawn_workers(context, configs).await;

        tracing::info!(workers = self.config.workers, "job manager started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.pool.shutdown_token().is_cancelled()
    }

    /// Stop accepting work from the queue and wait for workers to finish
    /// their current jobs.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown of job manager");
        self.pool.shutdown().await;
        tracing::info!(
            pending = self.queue.depth(),
            "Job manager shutdown complete"
        );
    }

    /// Store a new `Pending` job and queue it for execution.
    pub fn create_job(&self, request: JobRequest) -> Result<Job, JobError> {
        let spec = request.into_spec(&self.config)?;
        let span = telemetry::job_enqueue_span(spec.job_type, spec.priority);
        let _enter = span.enter();

        let job = self.store.create(spec);
        telemetry::record_job_created(job.id, job.job_type, job.priority);
        self.events.publish(JobEvent::new(
            job.id,
            JobEventPayload::Created {
                job_type: job.job_type,
                priority: job.priority,
            },
        ));

        self.queue.enqueue(job.priority, job.id);
        telemetry::set_queue_depth(self.queue.depth());
        Ok(job)
    }

    /// Validate `search` and submit it as a food-search job.
    pub fn create_food_search_job(&self, search: &SearchRequest) -> Result<Job, JobError> {
        self.create_job(JobRequest::food_search(search)?)
    }

    pub fn get_job(&self, id: JobId) -> Result<Job, JobError> {
        self.store.get(id).ok_or(JobError::NotFound(id))
    }

    /// Newest first, optionally filtered by status.
    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        self.store.list(status, limit)
    }

    /// One page of job summaries plus the total number of matches.
    pub fn list_page(&self, query: &ListQuery) -> Result<JobListResponse, JobError> {
        query.validate()?;
        let (jobs, total_count) = self.store.page(query.status, query.offset(), query.limit);
        Ok(JobListResponse {
            jobs: jobs.iter().map(JobResponse::summary).collect(),
            total_count,
            page: query.page,
            page_size: query.limit,
        })
    }

    /// Cancel a job that has not started yet.
    ///
    /// # Errors
    ///
    /// [`JobError::NotFound`] for an unknown id, [`JobError::NotCancellable`]
    /// if the job is no longer pending.
    pub fn cancel_job(&self, id: JobId) -> Result<Job, JobError> {
        let job = self.store.try_update(id, |job| {
            job.cancel(Utc::now())?;
            Ok(job.clone())
        })?;

        telemetry::record_job_finished(job.id, job.job_type, JobStatus::Cancelled);
        self.events
            .publish(JobEvent::new(job.id, JobEventPayload::Cancelled));
        Ok(job)
    }

    pub fn stats(&self) -> JobStats {
        self.store.counts().into()
    }

    /// Receive lifecycle events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }
}
