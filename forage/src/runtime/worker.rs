use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::dispatch::Dispatcher;
use crate::error::ExecutionError;
use crate::events::{InProcEventBus, JobEvent, JobEventPayload};
use crate::job::{FailureOutcome, JobStatus};
use crate::progress::ProgressReporter;
use crate::queue::{QueueTicket, TicketQueue};
use crate::retry::RetryPolicy;
use crate::store::JobStore;
use crate::telemetry;

use super::supervisor::ShutdownToken;

/// Configuration for individual workers in the runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Unique identifier for this worker.
    pub worker_id: String,
    /// Longest wait on an empty queue before checking for shutdown, in milliseconds.
    pub poll_interval_ms: u64,
    /// Pause after an infrastructure error, in milliseconds.
    pub error_backoff_ms: u64,
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            poll_interval_ms: 1000,
            error_backoff_ms: 1000,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_error_backoff(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("default-worker")
    }
}

/// Components every worker shares.
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<JobStore>,
    pub(crate) queue: Arc<dyn TicketQueue>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) events: Arc<InProcEventBus>,
    pub(crate) retry: RetryPolicy,
    pub(crate) enforce_timeouts: bool,
}

/// Worker loop. Exits only when `shutdown` is cancelled.
pub(crate) async fn run_worker(
    config: WorkerConfig,
    ctx: Arc<WorkerContext>,
    shutdown: ShutdownToken,
) {
    let poll = Duration::from_millis(config.poll_interval_ms.max(1));
    let backoff = Duration::from_millis(config.error_backoff_ms);
    tracing::info!(worker_id = %config.worker_id, "worker started");

    loop {
        if shutdown.is_cancelled() {
            tracing::info!("Worker {} shutting down", config.worker_id);
            break;
        }

        let dequeued = AssertUnwindSafe(ctx.queue.dequeue(poll))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("queue panicked: {}", panic_message(&*panic)))
            });

        match dequeued {
            Ok(None) => continue,
            Ok(Some(ticket)) => {
                telemetry::set_queue_depth(ctx.queue.depth());
                let span = telemetry::job_dequeue_span(
                    &config.worker_id,
                    ticket.job_id,
                    ticket.priority,
                );
                if let Err(err) = process_ticket(&config.worker_id, &ctx, ticket)
                    .instrument(span)
                    .await
                {
                    tracing::error!(
                        worker_id = %config.worker_id,
                        job_id = %ticket.job_id,
                        "worker failed to process ticket: {err:#}"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(err) => {
                tracing::error!(worker_id = %config.worker_id, "dequeue error: {err:#}");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Claim, execute and settle the job behind one ticket.
async fn process_ticket(
    worker_id: &str,
    ctx: &WorkerContext,
    ticket: QueueTicket,
) -> anyhow::Result<()> {
    let claimed = ctx
        .store
        .update(ticket.job_id, |job| {
            // Cancelled while queued, or a duplicate ticket.
            if job.status != JobStatus::Pending {
                return None;
            }
            job.start(Utc::now()).ok().map(|()| job.clone())
        })
        .with_context(|| format!("dequeued ticket for unknown job {}", ticket.job_id))?;

    let Some(job) = claimed else {
        tracing::debug!(job_id = %ticket.job_id, "skipping ticket for job that is no longer pending");
        return Ok(());
    };

    let attempt = job.attempt();
    tracing::info!(job_id = %job.id, job_type = %job.job_type, attempt, "job started");
    ctx.events.publish(JobEvent::new(
        job.id,
        JobEventPayload::Started {
            attempt,
            worker_id: worker_id.to_string(),
        },
    ));

    let reporter = ProgressReporter::new(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.events),
        job.id,
        attempt,
    );
    let timing = telemetry::record_job_start(job.id);
    let work = telemetry::instrument_dispatch(
        job.id,
        job.job_type,
        attempt,
        AssertUnwindSafe(ctx.dispatcher.dispatch(&job, &reporter)).catch_unwind(),
    )
    .map(|caught| {
        caught.unwrap_or_else(|panic| {
            Err(ExecutionError::Execution(format!(
                "job handler panicked: {}",
                panic_message(&*panic)
            )))
        })
    });
    let outcome = if ctx.enforce_timeouts {
        let budget = Duration::from_secs(job.timeout_seconds);
        match tokio::time::timeout(budget, work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExecutionError::TimedOut(job.timeout_seconds)),
        }
    } else {
        work.await
    };

    match outcome {
        Ok(result) => {
            telemetry::job_complete_span(job.id, job.job_type, JobStatus::Completed).in_scope(
                || -> anyhow::Result<()> {
                    ctx.store
                        .try_update(job.id, |record| record.complete(result, Utc::now()))
                        .context("failed to record job completion")?;
                    telemetry::record_job_end(timing, job.job_type, JobStatus::Completed);
                    telemetry::record_job_finished(job.id, job.job_type, JobStatus::Completed);
                    ctx.events
                        .publish(JobEvent::new(job.id, JobEventPayload::Completed { attempt }));
                    Ok(())
                },
            )?;
        }
        Err(error) => {
            let retryable = ctx.retry.is_retryable(&error);
            let message = error.to_string();
            let settled = ctx
                .store
                .try_update(job.id, |record| record.fail(message.clone(), retryable, Utc::now()))
                .context("failed to record job failure")?;

            match settled {
                FailureOutcome::Retry { attempt: next_attempt } => {
                    ctx.queue.enqueue(job.priority, job.id);
                    telemetry::set_queue_depth(ctx.queue.depth());
                    telemetry::record_job_end(timing, job.job_type, "retrying");
                    telemetry::record_job_retried(job.id, job.job_type, next_attempt, &message);
                    ctx.events.publish(JobEvent::new(
                        job.id,
                        JobEventPayload::Retrying {
                            next_attempt,
                            error: message,
                        },
                    ));
                }
                FailureOutcome::Failed => {
                    telemetry::job_complete_span(job.id, job.job_type, JobStatus::Failed).in_scope(|| {
                        tracing::warn!(attempt, retryable, error = %message, "job failed");
                        telemetry::record_job_end(timing, job.job_type, JobStatus::Failed);
                        telemetry::record_job_finished(job.id, job.job_type, JobStatus::Failed);
                    });
                    ctx.events.publish(JobEvent::new(
                        job.id,
                        JobEventPayload::Failed {
                            attempt,
                            error: message,
                            retryable,
                        },
                    ));
                }
            }
        }
    }

    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
