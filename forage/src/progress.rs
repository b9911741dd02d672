use std::sync::Arc;

use crate::events::{InProcEventBus, JobEvent, JobEventPayload};
use crate::job::{JobId, JobStatus};
use crate::store::JobStore;

/// Handle through which the executing worker reports progress for one attempt.
///
/// Updates are dropped once the job has left that attempt (retried, finished),
/// so a late report from an abandoned attempt cannot leak into the next one.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    store: Arc<JobStore>,
    events: Arc<InProcEventBus>,
    job_id: JobId,
    attempt: u32,
}

impl ProgressReporter {
    pub(crate) fn new(
        store: Arc<JobStore>,
        events: Arc<InProcEventBus>,
        job_id: JobId,
        attempt: u32,
    ) -> Self {
        Self {
            store,
            events,
            job_id,
            attempt,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record step `current_step` of `total_steps` at `percentage` (0-100).
    pub fn report(
        &self,
        current_step: u32,
        total_steps: u32,
        description: impl Into<String>,
        percentage: f64,
    ) {
        let description = description.into();
        let attempt = self.attempt;
        let applied = self.store.update(self.job_id, |job| {
            if job.status != JobStatus::Running || job.attempt() != attempt {
                return None;
            }
            job.update_progress(current_step, total_steps, description, percentage)
                .then(|| job.progress.clone())
        });

        match applied {
            Ok(Some(progress)) => {
                tracing::debug!(
                    job_id = %self.job_id,
                    attempt,
                    percentage = progress.progress_percentage,
                    step = %progress.step_description,
                    "progress updated"
                );
                self.events.publish(JobEvent::new(
                    self.job_id,
                    JobEventPayload::Progress {
                        attempt,
                        percentage: progress.progress_percentage,
                        step_description: progress.step_description,
                    },
                ));
            }
            Ok(None) => {
                tracing::trace!(job_id = %self.job_id, attempt, "stale progress report ignored");
            }
            Err(err) => {
                tracing::warn!(job_id = %self.job_id, "progress report failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobData, JobPriority, JobSpec, JobType};
    use chrono::Utc;

    fn running_job(store: &JobStore) -> JobId {
        let job = store.create(JobSpec {
            job_type: JobType::FoodSearch,
            job_data: JobData::new(),
            priority: JobPriority::default(),
            timeout_seconds: 30,
            max_retries: 3,
        });
        store.try_update(job.id, |job| job.start(Utc::now())).unwrap();
        job.id
    }

    #[tokio::test]
    async fn report_updates_job_and_publishes() {
        let store = Arc::new(JobStore::new());
        let events = Arc::new(InProcEventBus::new(8));
        let mut rx = events.subscribe();
        let id = running_job(&store);

        let reporter = ProgressReporter::new(Arc::clone(&store), events, id, 1);
        reporter.report(2, 4, "Initializing browser agent...", 50.0);

        let job = store.get(id).unwrap();
        assert_eq!(job.progress.current_step, 2);
        assert_eq!(job.progress.total_steps, 4);
        assert_eq!(job.progress.progress_percentage, 50.0);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.payload,
            JobEventPayload::Progress {
                attempt: 1,
                percentage: 50.0,
                step_description: "Initializing browser agent...".into(),
            }
        );
    }

    #[test]
    fn stale_attempt_is_ignored() {
        let store = Arc::new(JobStore::new());
        let events = Arc::new(InProcEventBus::new(8));
        let id = running_job(&store);

        let stale = ProgressReporter::new(Arc::clone(&store), events, id, 2);
        stale.report(3, 4, "ghost", 75.0);

        let job = store.get(id).unwrap();
        assert_eq!(job.progress.progress_percentage, 0.0);
        assert_eq!(job.progress.step_description, "Initializing...");
    }
}
