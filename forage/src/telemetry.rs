//! Tracing spans and lifecycle recording.
//!
//! Every `record_*` helper logs through `tracing` and, with the `metrics`
//! feature, also updates the matching Prometheus series.
//!
//! ```ignore
//! use forage::telemetry::{instrument_dispatch, record_job_start, record_job_end};
//!
//! let timing = record_job_start(job.id);
//! let outcome = instrument_dispatch(job.id, job.job_type, attempt, work).await;
//! record_job_end(timing, job.job_type, "completed");
//! ```

use std::fmt::Display;
use std::future::Future;

use tracing::{info_span, Instrument, Span};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Span covering one execution attempt of a job.
#[must_use]
pub fn job_dispatch_span(job_id: impl Display, job_type: impl Display, attempt: u32) -> Span {
    info_span!(
        "forage.dispatch",
        job_id = %job_id,
        job_type = %job_type,
        attempt = attempt,
    )
}

/// Span covering a worker taking a ticket off the queue.
#[must_use]
pub fn job_dequeue_span(worker_id: impl Display, job_id: impl Display, priority: impl Display) -> Span {
    info_span!(
        "forage.dequeue",
        worker_id = %worker_id,
        job_id = %job_id,
        priority = %priority,
    )
}

/// Span covering job creation and enqueue.
#[must_use]
pub fn job_enqueue_span(job_type: impl Display, priority: impl Display) -> Span {
    info_span!(
        "forage.enqueue",
        job_type = %job_type,
        priority = %priority,
    )
}

/// Span covering the status write after an attempt finishes.
#[must_use]
pub fn job_complete_span(job_id: impl Display, job_type: impl Display, status: impl Display) -> Span {
    info_span!(
        "forage.complete",
        job_id = %job_id,
        job_type = %job_type,
        status = %status,
    )
}

/// Attach a [`job_dispatch_span`] to `future`.
pub fn instrument_dispatch<F>(
    job_id: impl Display,
    job_type: impl Display,
    attempt: u32,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(job_dispatch_span(job_id, job_type, attempt))
}

pub fn record_job_created(job_id: impl Display, job_type: impl Display, priority: impl Display) {
    let job_type = job_type.to_string();
    tracing::info!(
        job_id = %job_id,
        job_type = %job_type,
        priority = %priority,
        "job created"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_created(&job_type);
}

/// Record a job reaching a final status (`completed`, `failed`, `cancelled`).
pub fn record_job_finished(job_id: impl Display, job_type: impl Display, status: impl Display) {
    let job_type = job_type.to_string();
    let status = status.to_string();
    tracing::info!(
        job_id = %job_id,
        job_type = %job_type,
        status = %status,
        "job finished"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_finished(&job_type, &status);
}

pub fn record_job_retried(
    job_id: impl Display,
    job_type: impl Display,
    next_attempt: u32,
    error: impl Display,
) {
    let job_type = job_type.to_string();
    tracing::warn!(
        job_id = %job_id,
        job_type = %job_type,
        next_attempt = next_attempt,
        error = %error,
        "job attempt failed, retrying"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_retried(&job_type);
}

pub fn set_queue_depth(depth: usize) {
    tracing::debug!(depth = depth, "queue depth updated");

    #[cfg(feature = "metrics")]
    crate::metrics::set_queue_depth(depth as f64);
}

pub fn observe_job_duration(job_type: impl Display, status: impl Display, duration_secs: f64) {
    let job_type = job_type.to_string();
    let status = status.to_string();
    tracing::debug!(
        job_type = %job_type,
        status = %status,
        duration_secs = duration_secs,
        "job duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_job_duration(&job_type, &status, duration_secs);
}

/// Start timing an attempt. Pass the handle to [`record_job_end`].
pub fn record_job_start(job_id: impl Display) -> JobTimingHandle {
    JobTimingHandle {
        job_id: job_id.to_string(),
        start: std::time::Instant::now(),
    }
}

pub fn record_job_end(handle: JobTimingHandle, job_type: impl Display, status: impl Display) {
    observe_job_duration(job_type, status, handle.elapsed().as_secs_f64());
}

/// Opaque timer returned by [`record_job_start`].
#[derive(Debug)]
pub struct JobTimingHandle {
    job_id: String,
    start: std::time::Instant,
}

impl JobTimingHandle {
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
