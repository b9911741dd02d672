use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use crate::error::ExecutionError;
use crate::job::{Job, JobType};
use crate::progress::ProgressReporter;
use crate::search::{SearchExecutor, SearchRequest};

/// Routes a job to the handler for its [`JobType`].
///
/// Blocking search work runs on tokio's blocking pool, throttled by a
/// semaphore so at most `blocking_permits` searches are in flight.
pub struct Dispatcher {
    search: Arc<dyn SearchExecutor>,
    blocking: Arc<Semaphore>,
    health_check_delay: Duration,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("search", &self.search.name())
            .field("available_permits", &self.blocking.available_permits())
            .field("health_check_delay", &self.health_check_delay)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        search: Arc<dyn SearchExecutor>,
        blocking_permits: usize,
        health_check_delay: Duration,
    ) -> Self {
        Self {
            search,
            blocking: Arc::new(Semaphore::new(blocking_permits.max(1))),
            health_check_delay,
        }
    }

    /// Run one attempt of `job`, reporting progress through `progress`.
    pub async fn dispatch(
        &self,
        job: &Job,
        progress: &ProgressReporter,
    ) -> Result<Value, ExecutionError> {
        match job.job_type {
            JobType::FoodSearch => self.food_search(job, progress).await,
            JobType::HealthCheck => self.health_check(progress).await,
        }
    }

    async fn food_search(
        &self,
        job: &Job,
        progress: &ProgressReporter,
    ) -> Result<Value, ExecutionError> {
        progress.report(1, 4, "Creating search request...", 25.0);
        let request = SearchRequest::from_job_data(&job.job_data)
            .map_err(|err| ExecutionError::Validation(err.to_string()))?;

        progress.report(2, 4, "Initializing browser agent...", 50.0);
        let permit = Arc::clone(&self.blocking)
            .acquire_owned()
            .await
            .map_err(|_| ExecutionError::Execution("search pool is closed".into()))?;

        progress.report(3, 4, "Searching...", 75.0);
        tracing::info!(job_id = %job.id, executor = self.search.name(), %request, "running food search");
        let executor = Arc::clone(&self.search);
        let response = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            executor.search(&request)
        })
        .await
        .map_err(|err| ExecutionError::Execution(format!("search task failed: {err}")))??;

        progress.report(4, 4, "Processing results...", 100.0);
        if !response.success {
            tracing::warn!(
                job_id = %job.id,
                error = response.error_message.as_deref().unwrap_or("unknown"),
                "search reported an unsuccessful response"
            );
        }

        serde_json::to_value(&response)
            .map_err(|err| ExecutionError::Execution(format!("failed to encode search response: {err}")))
    }

    async fn health_check(&self, progress: &ProgressReporter) -> Result<Value, ExecutionError> {
        progress.report(1, 1, "Running health check...", 50.0);
        tokio::time::sleep(self.health_check_delay).await;
        Ok(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
            "message": "Search system is operational",
        }))
    }
}
