use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Errors surfaced synchronously to callers of the job API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    /// No job with this id was ever issued.
    #[error("job {0} not found")]
    NotFound(JobId),
    /// The job exists but is past the point where it can be cancelled.
    #[error("cannot cancel job {id} in status: {status}")]
    NotCancellable { id: JobId, status: JobStatus },
    /// Priority outside of the accepted 1..=10 range.
    #[error("priority must be between 1 and 10, got {0}")]
    InvalidPriority(i64),
    /// Timeout outside of the accepted 1..=86400 second range.
    #[error("timeout_seconds must be between 1 and 86400, got {0}")]
    InvalidTimeout(u64),
    /// A lifecycle transition the state machine does not allow.
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    /// Malformed request data.
    #[error("{0}")]
    Validation(String),
}

/// Job-level failure produced while executing a job.
///
/// These never escape the worker; they are recorded on the job record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The job data could not be interpreted. Permanent.
    #[error("{0}")]
    Validation(String),
    /// The delegate failed while running. Transient.
    #[error("{0}")]
    Execution(String),
    /// The attempt exceeded its `timeout_seconds` budget.
    #[error("Job exceeded timeout of {0} seconds")]
    TimedOut(u64),
}

impl ExecutionError {
    /// Whether the failure class is worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ExecutionError::Validation(_))
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        ExecutionError::Execution(format!("{err:#}"))
    }
}
