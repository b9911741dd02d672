use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// Opaque key-value payload handed to the executor.
pub type JobData = serde_json::Map<String, serde_json::Value>;

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| JobError::Validation(format!("invalid job id: {s}")))
    }
}

/// Longest accepted `timeout_seconds`: one day.
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400;

/// Check a per-job timeout against `1..=MAX_TIMEOUT_SECONDS`.
pub fn validate_timeout(timeout_seconds: u64) -> Result<u64, JobError> {
    if (1..=MAX_TIMEOUT_SECONDS).contains(&timeout_seconds) {
        Ok(timeout_seconds)
    } else {
        Err(JobError::InvalidTimeout(timeout_seconds))
    }
}

/// Urgency of a job, 1 (lowest) to 10 (highest).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct JobPriority(u8);

impl JobPriority {
    pub const LOWEST: JobPriority = JobPriority(1);
    pub const HIGHEST: JobPriority = JobPriority(10);

    pub fn new(value: i64) -> Result<Self, JobError> {
        if (1..=10).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(JobError::InvalidPriority(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<i64> for JobPriority {
    type Error = JobError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobPriority> for u8 {
    fn from(priority: JobPriority) -> Self {
        priority.0
    }
}

impl Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs. Selects the handler at dispatch time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FoodSearch,
    HealthCheck,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FoodSearch => "food_search",
            JobType::HealthCheck => "health_check",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "food_search" => Ok(JobType::FoodSearch),
            "health_check" => Ok(JobType::HealthCheck),
            other => Err(JobError::Validation(format!("Unknown job type: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// No transition ever leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Terminal, or failed with the retry budget spent.
    ///
    /// A job is only ever observed as `Failed` once its retries are exhausted,
    /// because the retry path moves a running job straight back to `Pending`.
    pub fn is_finished(&self) -> bool {
        self.is_terminal() || *self == JobStatus::Failed
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| JobError::Validation(format!("Unknown job status: {s}")))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: u32,
    pub total_steps: u32,
    pub step_description: String,
    pub progress_percentage: f64,
}

impl JobProgress {
    fn starting() -> Self {
        Self {
            step_description: "Initializing...".to_string(),
            ..Self::default()
        }
    }
}

/// Everything needed to create a job record.
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub job_type: JobType,
    pub job_data: JobData,
    pub priority: JobPriority,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

/// What happened to a running job after its executor failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureOutcome {
    /// Back to `Pending`; `attempt` is the number of the next execution.
    Retry { attempt: u32 },
    /// Retry budget spent or failure not retryable.
    Failed,
}

/// A unit of asynchronous work and its lifecycle state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub job_data: JobData,
    pub priority: JobPriority,
    pub timeout_seconds: u64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl Job {
    pub(crate) fn new(spec: JobSpec, sequence: u64) -> Self {
        Self {
            id: JobId::new(),
            job_type: spec.job_type,
            job_data: spec.job_data,
            priority: spec.priority,
            timeout_seconds: spec.timeout_seconds,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: JobProgress::default(),
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: spec.max_retries,
            sequence,
        }
    }

    /// 1-based number of the current (or next) execution attempt.
    pub fn attempt(&self) -> u32 {
        self.retry_count + 1
    }

    /// Creation order within the store; larger is newer.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn transition_error(&self, to: JobStatus) -> JobError {
        JobError::InvalidTransition {
            id: self.id,
            from: self.status,
            to,
        }
    }

    // Timestamps never precede the ones set before them.
    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.started_at.unwrap_or(self.created_at))
    }

    pub(crate) fn start(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now.max(self.created_at));
        self.progress = JobProgress::starting();
        Ok(())
    }

    pub(crate) fn complete(
        &mut self,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), JobError> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(self.stamp(now));
        self.result = Some(result);
        self.error_message = None;
        self.progress.progress_percentage = 100.0;
        self.progress.step_description = "Completed".to_string();
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// With `retryable` set and budget left, the job is reset to `Pending`
    /// with cleared timestamps, error and progress; the caller re-enqueues it.
    pub(crate) fn fail(
        &mut self,
        error: String,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, JobError> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Failed));
        }

        if retryable && self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.status = JobStatus::Pending;
            self.started_at = None;
            self.completed_at = None;
            self.error_message = None;
            self.progress = JobProgress::default();
            return Ok(FailureOutcome::Retry {
                attempt: self.attempt(),
            });
        }

        self.status = JobStatus::Failed;
        self.completed_at = Some(self.stamp(now));
        self.progress.step_description = format!("Failed: {error}");
        self.error_message = Some(error);
        Ok(FailureOutcome::Failed)
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        if self.status != JobStatus::Pending {
            return Err(JobError::NotCancellable {
                id: self.id,
                status: self.status,
            });
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(self.stamp(now));
        Ok(())
    }

    /// Apply a progress update from the executing worker.
    ///
    /// Ignored unless the job is running. The percentage never moves
    /// backwards within an attempt and is clamped to 0..=100.
    pub(crate) fn update_progress(
        &mut self,
        current_step: u32,
        total_steps: u32,
        step_description: String,
        percentage: f64,
    ) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let requested = if percentage.is_finite() {
            percentage.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.progress.current_step = current_step;
        self.progress.total_steps = total_steps;
        self.progress.step_description = step_description;
        self.progress.progress_percentage =
            self.progress.progress_percentage.max(requested);
        true
    }
}
