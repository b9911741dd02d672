//! Request and response shapes for the routing layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ManagerConfig;
use crate::error::JobError;
use crate::job::{
    validate_timeout, Job, JobData, JobId, JobPriority, JobProgress, JobSpec, JobStatus, JobType,
};
use crate::search::SearchRequest;
use crate::store::StatusCounts;

/// Submission of a new job. Omitted fields take the manager's defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_type: JobType,
    #[serde(default)]
    pub job_data: JobData,
    #[serde(default)]
    pub priority: Option<JobPriority>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobRequest {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            job_data: JobData::new(),
            priority: None,
            timeout_seconds: None,
            max_retries: None,
        }
    }

    /// Food search at priority 5 with a 300 second budget.
    pub fn food_search(request: &SearchRequest) -> Result<Self, JobError> {
        request.validate()?;
        Ok(Self {
            job_data: request.to_job_data()?,
            priority: Some(JobPriority::default()),
            timeout_seconds: Some(300),
            ..Self::new(JobType::FoodSearch)
        })
    }

    pub fn health_check() -> Self {
        Self::new(JobType::HealthCheck)
    }

    pub fn with_data(mut self, job_data: JobData) -> Self {
        self.job_data = job_data;
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub(crate) fn into_spec(self, config: &ManagerConfig) -> Result<JobSpec, JobError> {
        let timeout_seconds =
            validate_timeout(self.timeout_seconds.unwrap_or(config.default_timeout_seconds))?;
        Ok(JobSpec {
            job_type: self.job_type,
            job_data: self.job_data,
            priority: self.priority.unwrap_or_else(|| config.default_priority()),
            timeout_seconds,
            max_retries: self.max_retries.unwrap_or(config.default_max_retries),
        })
    }
}

/// Status view of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl JobResponse {
    /// Acknowledgement returned right after submission.
    pub fn created(job: &Job) -> Self {
        // 80% of the timeout; no estimate if that does not fit a timestamp.
        let estimated_completion = i64::try_from(job.timeout_seconds)
            .ok()
            .and_then(|secs| secs.checked_mul(800))
            .and_then(Duration::try_milliseconds)
            .and_then(|estimate| job.created_at.checked_add_signed(estimate));
        Self {
            job_id: job.id,
            status: job.status,
            message: "Job created successfully".to_string(),
            created_at: job.created_at,
            progress: None,
            result: None,
            error_message: None,
            estimated_completion,
        }
    }

    /// Short form used in listings.
    pub fn summary(job: &Job) -> Self {
        let message = match job.status {
            JobStatus::Pending => "Queued for processing".to_string(),
            JobStatus::Running => format!("Running: {}", job.progress.step_description),
            JobStatus::Completed => "Completed successfully".to_string(),
            JobStatus::Failed => format!("Failed: {}", job.error_message.as_deref().unwrap_or("")),
            JobStatus::Cancelled => "Cancelled".to_string(),
        };
        Self::with_message(job, message)
    }

    fn with_message(job: &Job, message: String) -> Self {
        let mut response = Self {
            job_id: job.id,
            status: job.status,
            message,
            created_at: job.created_at,
            progress: None,
            result: None,
            error_message: None,
            estimated_completion: None,
        };
        match job.status {
            JobStatus::Running => response.progress = Some(job.progress.clone()),
            JobStatus::Completed => response.result = job.result.clone(),
            JobStatus::Failed => response.error_message = job.error_message.clone(),
            JobStatus::Pending | JobStatus::Cancelled => {}
        }
        response
    }
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        let message = match job.status {
            JobStatus::Pending => "Job is queued for processing".to_string(),
            JobStatus::Running => format!("Job is running: {}", job.progress.step_description),
            JobStatus::Completed => "Job completed successfully".to_string(),
            JobStatus::Failed => {
                format!("Job failed: {}", job.error_message.as_deref().unwrap_or(""))
            }
            JobStatus::Cancelled => "Job was cancelled".to_string(),
        };
        Self::with_message(job, message)
    }
}

pub const MAX_PAGE_SIZE: usize = 100;

/// Listing parameters: optional status filter, page size 1..=100, page >= 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub page: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: 20,
            page: 1,
        }
    }
}

impl ListQuery {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(JobError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.limit
            )));
        }
        if self.page == 0 {
            return Err(JobError::Validation("page must be at least 1".into()));
        }
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    /// Matches across all pages.
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl From<StatusCounts> for JobStats {
    fn from(counts: StatusCounts) -> Self {
        Self {
            total_jobs: counts.total(),
            pending: counts.pending,
            running: counts.running,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub message: String,
}

impl CancelResponse {
    pub fn for_job(id: JobId) -> Self {
        Self {
            message: format!("Job {id} cancelled successfully"),
        }
    }
}
