//! Forage - asynchronous job execution for long-running food searches.
//!
//! Callers submit jobs and poll for their status; a fixed pool of workers
//! pulls job ids off a priority queue and runs the handler for each job type.
//! Long-running, blocking search work is pushed onto a bounded blocking pool so
//! the async scheduler stays responsive.
//!
//! # Core Concepts
//!
//! - **Job**: a [`Job`] record with a lifecycle state machine
//!   (`pending -> running -> completed | failed`, `pending -> cancelled`).
//!   Failed attempts go back to `pending` while retry budget remains.
//!
//! - **Store**: the [`JobStore`] owns every record for the life of the process.
//!
//! - **Queue**: [`TicketQueue`] hands `(priority, id)` tickets to workers,
//!   most urgent first and FIFO within a priority.
//!
//! - **Dispatch**: the [`Dispatcher`] matches on [`JobType`] and drives the
//!   [`SearchExecutor`] or the health check, reporting progress as it goes.
//!
//! - **Manager**: [`JobManager`] composes the above and owns the worker pool.
//!
//! # Feature Flags
//!
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forage::{JobManagerBuilder, ManagerConfig, SampleSearchExecutor, SearchRequest};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let manager = JobManagerBuilder::new(ManagerConfig::default())
//!     .with_search_executor(Arc::new(SampleSearchExecutor))
//!     .build()?;
//! manager.start().await?;
//!
//! let job = manager.create_food_search_job(&SearchRequest::new("Buenos Aires"))?;
//! let snapshot = manager.get_job(job.id)?;
//! println!("{}", snapshot.status);
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Request and response shapes consumed by a routing layer.
pub mod api;

/// Manager and worker configuration.
pub mod config;

/// Executor dispatch by job type.
pub mod dispatch;

/// Typed errors for the job API and for job execution.
pub mod error;

/// Job lifecycle events and the in-process event bus.
pub mod events;

/// Core job types and the lifecycle state machine.
///
/// - [`Job`] - the job record
/// - [`JobId`] - unique job identifier
/// - [`JobPriority`] - urgency 1..=10
/// - [`JobType`] - closed set of job kinds
/// - [`JobStatus`] - lifecycle states
/// - [`JobProgress`] - progress reported by the running handler
pub mod job;

/// The job manager facade.
pub mod manager;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled with the `metrics` feature.
pub mod metrics;

/// Progress reporting from a running handler.
pub mod progress;

/// Priority queue of job tickets.
pub mod queue;

/// Retry classification of failed attempts.
pub mod retry;

/// Worker pool, worker loop and manager builder.
pub mod runtime;

/// Food-search request, response and executor contract.
pub mod search;

/// In-memory job store.
pub mod store;

/// Tracing spans, lifecycle logging and tracing setup.
pub mod telemetry;

pub use api::*;
pub use config::*;
pub use dispatch::Dispatcher;
pub use error::*;
pub use events::*;
pub use job::*;
pub use manager::JobManager;
pub use progress::ProgressReporter;
pub use queue::*;
pub use retry::RetryPolicy;
pub use runtime::{JobManagerBuilder, ShutdownToken, WorkerConfig, WorkerPool};
pub use search::*;
pub use store::*;
