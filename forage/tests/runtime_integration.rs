//! Runtime integration tests for the forage job manager.
//!
//! Covers priority ordering, retry bounds, validation failures,
//! cancellation, progress reporting, queue outages, timeouts and shutdown.

use std::sync::Arc;
use std::time::Duration;

use forage::*;
use forage_testkit::*;
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

fn unstarted(config: ManagerConfig, executor: Arc<dyn SearchExecutor>, queue: FlakyQueue) -> JobManager {
    JobManagerBuilder::new(config)
        .with_search_executor(executor)
        .with_queue(Arc::new(queue))
        .build()
        .expect("manager should build")
}

fn progress_by_attempt(events: &[JobEvent], attempt: u32) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match &event.payload {
            JobEventPayload::Progress {
                attempt: a,
                percentage,
                ..
            } if *a == attempt => Some(*percentage),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn higher_priority_jobs_are_dequeued_first() {
    let queue = FlakyQueue::new();
    let manager = unstarted(
        test_config(),
        Arc::new(ScriptedSearchExecutor::succeeding()),
        queue.clone(),
    );

    let low = manager
        .create_job(JobRequest::health_check().with_priority(priority(1)))
        .unwrap();
    let mid_first = manager
        .create_job(JobRequest::health_check().with_priority(priority(5)))
        .unwrap();
    let high = manager
        .create_job(JobRequest::health_check().with_priority(priority(9)))
        .unwrap();
    let mid_second = manager
        .create_job(JobRequest::health_check().with_priority(priority(5)))
        .unwrap();

    manager.start().await.unwrap();
    for id in [low.id, mid_first.id, high.id, mid_second.id] {
        wait_for_status(&manager, id, JobStatus::Completed, WAIT)
            .await
            .unwrap();
    }

    assert_eq!(
        queue.dequeued_ids(),
        vec![high.id, mid_first.id, mid_second.id, low.id]
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn health_check_completes_with_status_payload() {
    let manager = start_manager(
        test_config(),
        Arc::new(ScriptedSearchExecutor::succeeding()),
        None,
    )
    .await
    .unwrap();
    let mut rx = manager.subscribe();

    let job = manager.create_job(JobRequest::health_check()).unwrap();
    let done = wait_for_status(&manager, job.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();

    let result = done.result.expect("completed job carries a result");
    assert_eq!(result["status"], "healthy");
    assert_eq!(result["message"], "Search system is operational");
    assert_eq!(done.progress.progress_percentage, 100.0);
    assert!(done.started_at.unwrap() <= done.completed_at.unwrap());

    let events = collect_events_until(&mut rx, WAIT, |event| {
        matches!(event.payload, JobEventPayload::Completed { .. })
    })
    .await;
    let names: Vec<&str> = events.iter().map(|e| e.payload.name()).collect();
    assert_eq!(names, vec!["created", "started", "progress", "completed"]);
    assert!(events.iter().all(|e| e.job_id() == job.id));

    manager.shutdown().await;
}

#[tokio::test]
async fn food_search_result_is_stored_on_completion() {
    let executor = ScriptedSearchExecutor::succeeding();
    let manager = start_manager(test_config(), Arc::new(executor.clone()), None)
        .await
        .unwrap();

    let request = SearchRequest::new("Palermo, Buenos Aires")
        .with_query("pizza")
        .with_max_results(2);
    let job = manager.create_food_search_job(&request).unwrap();
    let done = wait_for_status(&manager, job.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();

    let response: SearchResponse = serde_json::from_value(done.result.unwrap()).unwrap();
    assert!(response.success);
    assert_eq!(done.progress.progress_percentage, 100.0);
    assert_eq!(done.progress.current_step, 4);
    assert!(done.error_message.is_none());

    executor.assert_call_count_eq(1);
    let call = &executor.calls()[0];
    assert_eq!(call.location, "Palermo, Buenos Aires");
    assert_eq!(call.search_query, "pizza");
    assert_eq!(call.max_results, 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn unsuccessful_search_response_still_completes() {
    let executor = ScriptedSearchExecutor::new(SearchScript::Unsuccessful("captcha".into()));
    let manager = start_manager(test_config(), Arc::new(executor), None)
        .await
        .unwrap();

    let job = manager.create_job(food_search("Recoleta")).unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["error_message"], "captcha");
    manager.shutdown().await;
}

#[tokio::test]
async fn failing_search_is_retried_up_to_max_retries() {
    let executor = ScriptedSearchExecutor::failing("browser crashed");
    let manager = start_manager(test_config(), Arc::new(executor.clone()), None)
        .await
        .unwrap();
    let mut rx = manager.subscribe();

    let job = manager
        .create_job(food_search("Palermo").with_max_retries(3))
        .unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.retry_count, 3);
    assert_eq!(done.error_message.as_deref(), Some("browser crashed"));
    assert!(done.completed_at.is_some());
    executor.assert_call_count_eq(4);

    let events = collect_events_until(&mut rx, WAIT, |event| {
        matches!(event.payload, JobEventPayload::Failed { .. })
    })
    .await;
    let retries: Vec<u32> = events
        .iter()
        .filter_map(|event| match &event.payload {
            JobEventPayload::Retrying { next_attempt, .. } => Some(*next_attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2, 3, 4]);
    assert!(matches!(
        events.last().map(|e| &e.payload),
        Some(JobEventPayload::Failed {
            attempt: 4,
            retryable: true,
            ..
        })
    ));

    manager.shutdown().await;
}

#[tokio::test]
async fn zero_max_retries_fails_after_one_attempt() {
    let executor = ScriptedSearchExecutor::failing("no network");
    let manager = start_manager(test_config(), Arc::new(executor.clone()), None)
        .await
        .unwrap();

    let job = manager
        .create_job(food_search("Palermo").with_max_retries(0))
        .unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.retry_count, 0);
    executor.assert_call_count_eq(1);
    manager.shutdown().await;
}

#[tokio::test]
async fn invalid_job_data_fails_without_retry() {
    let executor = ScriptedSearchExecutor::succeeding();
    let manager = start_manager(test_config(), Arc::new(executor.clone()), None)
        .await
        .unwrap();

    let job = manager
        .create_job(JobRequest::new(JobType::FoodSearch).with_max_retries(3))
        .unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.retry_count, 0);
    assert!(done
        .error_message
        .as_deref()
        .is_some_and(|msg| msg.contains("location")));
    executor.assert_call_count_eq(0);
    manager.shutdown().await;
}

#[tokio::test]
async fn validation_errors_retry_when_configured() {
    let config = ManagerConfig {
        retry_validation_errors: true,
        ..test_config()
    };
    let manager = start_manager(config, Arc::new(ScriptedSearchExecutor::succeeding()), None)
        .await
        .unwrap();

    let job = manager
        .create_job(JobRequest::new(JobType::FoodSearch).with_max_retries(2))
        .unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.retry_count, 2);
    manager.shutdown().await;
}

#[tokio::test]
async fn progress_is_monotonic_per_attempt_and_resets_on_retry() {
    let executor = ScriptedSearchExecutor::failing_times(1);
    let manager = start_manager(test_config(), Arc::new(executor.clone()), None)
        .await
        .unwrap();
    let mut rx = manager.subscribe();

    let job = manager
        .create_job(food_search("San Telmo").with_max_retries(1))
        .unwrap();
    let events = collect_events_until(&mut rx, WAIT, |event| {
        matches!(
            event.payload,
            JobEventPayload::Completed { .. } | JobEventPayload::Failed { .. }
        )
    })
    .await;

    assert_eq!(progress_by_attempt(&events, 1), vec![25.0, 50.0, 75.0]);
    assert_eq!(progress_by_attempt(&events, 2), vec![25.0, 50.0, 75.0, 100.0]);

    let retry_at = events
        .iter()
        .position(|e| matches!(e.payload, JobEventPayload::Retrying { .. }))
        .expect("a retry event");
    let second_start = events
        .iter()
        .position(|e| matches!(e.payload, JobEventPayload::Started { attempt: 2, .. }))
        .expect("second attempt started");
    assert!(retry_at < second_start);

    let done = manager.get_job(job.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.retry_count, 1);
    assert!(done.error_message.is_none());
    executor.assert_call_count_eq(2);
    manager.shutdown().await;
}

#[tokio::test]
async fn cancelled_pending_job_is_never_executed() {
    let executor = ScriptedSearchExecutor::succeeding();
    let queue = FlakyQueue::new();
    let manager = unstarted(test_config(), Arc::new(executor.clone()), queue.clone());

    let cancelled = manager.create_job(food_search("Belgrano")).unwrap();
    let kept = manager.create_job(JobRequest::health_check()).unwrap();
    let response = manager.cancel_job(cancelled.id).unwrap();
    assert_eq!(response.status, JobStatus::Cancelled);
    assert!(response.completed_at.is_some());

    manager.start().await.unwrap();
    wait_for_status(&manager, kept.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let job = manager.get_job(cancelled.id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.started_at.is_none());
    executor.assert_call_count_eq(0);
    assert!(queue.dequeued_ids().contains(&cancelled.id));

    let stats = manager.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn running_job_cannot_be_cancelled() {
    let executor = ScriptedSearchExecutor::slow(Duration::from_millis(300));
    let manager = start_manager(test_config(), Arc::new(executor), None)
        .await
        .unwrap();

    let job = manager.create_job(food_search("Palermo")).unwrap();
    wait_for_status(&manager, job.id, JobStatus::Running, WAIT)
        .await
        .unwrap();

    let err = manager.cancel_job(job.id).unwrap_err();
    assert_eq!(
        err,
        JobError::NotCancellable {
            id: job.id,
            status: JobStatus::Running
        }
    );

    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    manager.shutdown().await;
}

#[tokio::test]
async fn cancel_unknown_job_is_not_found() {
    let manager = start_manager(
        test_config(),
        Arc::new(ScriptedSearchExecutor::succeeding()),
        None,
    )
    .await
    .unwrap();
    let id = JobId::new();
    assert_eq!(manager.cancel_job(id).unwrap_err(), JobError::NotFound(id));
    manager.shutdown().await;
}

#[tokio::test]
async fn list_filters_by_status_newest_first() {
    let manager = start_manager(
        test_config(),
        Arc::new(ScriptedSearchExecutor::succeeding()),
        None,
    )
    .await
    .unwrap();

    let first = manager.create_job(JobRequest::health_check()).unwrap();
    wait_for_status(&manager, first.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();
    manager.shutdown().await;

    // Workers are gone, so these stay pending.
    let second = manager.create_job(JobRequest::health_check()).unwrap();
    let third = manager.create_job(food_search("Palermo")).unwrap();

    let completed: Vec<JobId> = manager
        .list_jobs(Some(JobStatus::Completed), 10)
        .iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(completed, vec![first.id]);

    let pending: Vec<JobId> = manager
        .list_jobs(Some(JobStatus::Pending), 10)
        .iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(pending, vec![third.id, second.id]);

    let all: Vec<JobId> = manager.list_jobs(None, 2).iter().map(|j| j.id).collect();
    assert_eq!(all, vec![third.id, second.id]);

    let page = manager.list_page(&ListQuery::status(JobStatus::Pending)).unwrap();
    assert_eq!(page.total_count, 2);

    let stats = manager.stats();
    assert_eq!(stats.total_jobs, 3);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn worker_recovers_from_queue_outage() {
    let queue = FlakyQueue::new();
    queue.fail_next(3);
    let manager = start_manager(
        test_config(),
        Arc::new(ScriptedSearchExecutor::succeeding()),
        Some(Arc::new(queue.clone())),
    )
    .await
    .unwrap();

    let job = manager.create_job(JobRequest::health_check()).unwrap();
    let done = wait_for_status(&manager, job.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();

    assert_eq!(done.retry_count, 0);
    assert_eq!(queue.failures_served(), 3);
    assert!(manager.is_running());
    manager.shutdown().await;
}

#[tokio::test]
async fn timeout_watchdog_fails_slow_job() {
    let config = ManagerConfig {
        enforce_timeouts: true,
        ..test_config()
    };
    let executor = ScriptedSearchExecutor::slow(Duration::from_millis(1500));
    let manager = start_manager(config, Arc::new(executor), None)
        .await
        .unwrap();

    let job = manager
        .create_job(food_search("Palermo").with_timeout(1).with_max_retries(0))
        .unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(
        done.error_message.as_deref(),
        Some("Job exceeded timeout of 1 seconds")
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_lets_in_flight_job_finish() {
    let executor = ScriptedSearchExecutor::slow(Duration::from_millis(200));
    let manager = start_manager(test_config(), Arc::new(executor), None)
        .await
        .unwrap();

    let job = manager.create_job(food_search("Palermo")).unwrap();
    wait_for_status(&manager, job.id, JobStatus::Running, WAIT)
        .await
        .unwrap();

    tokio::time::timeout(WAIT, manager.shutdown())
        .await
        .expect("shutdown should finish in time");

    assert!(!manager.is_running());
    assert_eq!(manager.get_job(job.id).unwrap().status, JobStatus::Completed);
    assert!(manager.start().await.is_err());
}

#[tokio::test]
async fn retry_is_requeued_at_original_priority() {
    let queue = FlakyQueue::new();
    let manager = unstarted(
        test_config(),
        Arc::new(ScriptedSearchExecutor::failing_times(1)),
        queue.clone(),
    );

    let urgent = manager
        .create_job(
            food_search("Palermo")
                .with_priority(priority(9))
                .with_max_retries(1),
        )
        .unwrap();
    let background: Vec<JobId> = (0..3)
        .map(|_| {
            manager
                .create_job(JobRequest::health_check().with_priority(priority(1)))
                .unwrap()
                .id
        })
        .collect();

    manager.start().await.unwrap();
    for id in std::iter::once(urgent.id).chain(background.iter().copied()) {
        wait_for_status(&manager, id, JobStatus::Completed, WAIT)
            .await
            .unwrap();
    }

    let tickets = queue.tickets_for(urgent.id);
    assert_eq!(tickets.len(), 2);
    assert!(tickets.iter().all(|t| t.priority == priority(9)));

    let mut expected = vec![urgent.id, urgent.id];
    expected.extend(background);
    assert_eq!(queue.dequeued_ids(), expected);
    assert_eq!(manager.get_job(urgent.id).unwrap().retry_count, 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn worker_survives_queue_panics() {
    let queue = FlakyQueue::new();
    queue.panic_next(2);
    let manager = start_manager(
        test_config(),
        Arc::new(ScriptedSearchExecutor::succeeding()),
        Some(Arc::new(queue.clone())),
    )
    .await
    .unwrap();

    let job = manager.create_job(JobRequest::health_check()).unwrap();
    wait_for_status(&manager, job.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();

    assert_eq!(queue.dequeued_ids(), vec![job.id]);
    assert!(manager.is_running());
    manager.shutdown().await;
}

#[tokio::test]
async fn panicking_search_fails_the_attempt() {
    let executor = ScriptedSearchExecutor::new(SearchScript::Panic("renderer crashed".into()));
    let manager = start_manager(test_config(), Arc::new(executor.clone()), None)
        .await
        .unwrap();

    let job = manager
        .create_job(food_search("Palermo").with_max_retries(1))
        .unwrap();
    let done = wait_until_finished(&manager, job.id, WAIT).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.retry_count, 1);
    assert!(done
        .error_message
        .as_deref()
        .is_some_and(|msg| msg.contains("panicked")));
    executor.assert_call_count_eq(2);

    let next = manager.create_job(JobRequest::health_check()).unwrap();
    wait_for_status(&manager, next.id, JobStatus::Completed, WAIT)
        .await
        .unwrap();
    manager.shutdown().await;
}
