use std::sync::Arc;
use std::time::Duration;

use forage::*;
use serde_json::json;
use tokio::sync::broadcast;

/// Fast-polling config for tests: one worker, no health-check delay.
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        workers: 1,
        poll_interval_ms: 10,
        error_backoff_ms: 10,
        health_check_delay_ms: 0,
        shutdown_timeout_secs: 5,
        ..ManagerConfig::default()
    }
}

/// Build and start a manager around `executor` and `queue`.
pub async fn start_manager(
    config: ManagerConfig,
    executor: Arc<dyn SearchExecutor>,
    queue: Option<Arc<dyn TicketQueue>>,
) -> anyhow::Result<Arc<JobManager>> {
    let mut builder = JobManagerBuilder::new(config).with_search_executor(executor);
    if let Some(queue) = queue {
        builder = builder.with_queue(queue);
    }
    let manager = Arc::new(builder.build()?);
    manager.start().await?;
    Ok(manager)
}

/// Job data for a food search in `location`.
pub fn search_data(location: &str) -> JobData {
    let mut data = JobData::new();
    data.insert("location".into(), json!(location));
    data.insert("max_results".into(), json!(3));
    data
}

pub fn food_search(location: &str) -> JobRequest {
    JobRequest::new(JobType::FoodSearch).with_data(search_data(location))
}

pub fn priority(value: i64) -> JobPriority {
    JobPriority::new(value).unwrap_or_default()
}

/// Poll until `predicate` holds for the job or `timeout` elapses.
pub async fn wait_for(
    manager: &JobManager,
    id: JobId,
    timeout: Duration,
    predicate: impl Fn(&Job) -> bool,
) -> anyhow::Result<Job> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = manager.get_job(id)?;
        if predicate(&job) {
            return Ok(job);
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!(
                "job {id} still {} after {:?} (attempt {})",
                job.status,
                timeout,
                job.attempt()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_status(
    manager: &JobManager,
    id: JobId,
    status: JobStatus,
    timeout: Duration,
) -> anyhow::Result<Job> {
    wait_for(manager, id, timeout, |job| job.status == status).await
}

pub async fn wait_until_finished(
    manager: &JobManager,
    id: JobId,
    timeout: Duration,
) -> anyhow::Result<Job> {
    wait_for(manager, id, timeout, |job| job.status.is_finished()).await
}

/// Drain events until `stop` matches one (inclusive) or `timeout` elapses.
pub async fn collect_events_until(
    rx: &mut broadcast::Receiver<JobEvent>,
    timeout: Duration,
    stop: impl Fn(&JobEvent) -> bool,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = stop(&event);
                    events.push(event);
                    if done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("test subscriber lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    events
}
