use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::events::MAX_EVENT_CAPACITY;
use crate::job::{validate_timeout, JobPriority};
use crate::retry::RetryPolicy;

/// Configuration for a [`JobManager`](crate::JobManager).
///
/// Every field has a default, so partial documents deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of concurrent worker loops.
    pub workers: usize,
    /// Longest a worker waits on an empty queue before rechecking shutdown.
    pub poll_interval_ms: u64,
    /// Pause after an infrastructure error in the worker loop.
    pub error_backoff_ms: u64,
    /// Permits on the blocking execution pool. `None` uses `workers`.
    pub blocking_threads: Option<usize>,
    /// Retry ceiling applied when a request does not set one.
    pub default_max_retries: u32,
    /// Priority applied when a request does not set one.
    pub default_priority: u8,
    /// Timeout applied when a request does not set one.
    pub default_timeout_seconds: u64,
    /// Fail attempts that outlive their `timeout_seconds`.
    pub enforce_timeouts: bool,
    /// Retry failures caused by malformed job data.
    pub retry_validation_errors: bool,
    /// Upper bound on waiting for each worker during shutdown.
    pub shutdown_timeout_secs: u64,
    /// Per-subscriber buffer of the event bus.
    pub event_capacity: usize,
    /// Simulated latency of the health-check handler.
    pub health_check_delay_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 1000,
            error_backoff_ms: 1000,
            blocking_threads: None,
            default_max_retries: 3,
            default_priority: 5,
            default_timeout_seconds: 300,
            enforce_timeouts: false,
            retry_validation_errors: false,
            shutdown_timeout_secs: 30,
            event_capacity: 1024,
            health_check_delay_ms: 2000,
        }
    }
}

impl ManagerConfig {
    /// Reject settings the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.workers == 0 {
            return Err(JobError::Validation("workers must be at least 1".into()));
        }
        if self.blocking_threads == Some(0) {
            return Err(JobError::Validation(
                "blocking_threads must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(JobError::Validation(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        validate_timeout(self.default_timeout_seconds)?;
        if !(1..=MAX_EVENT_CAPACITY).contains(&self.event_capacity) {
            return Err(JobError::Validation(format!(
                "event_capacity must be between 1 and {MAX_EVENT_CAPACITY}, got {}",
                self.event_capacity
            )));
        }
        JobPriority::new(i64::from(self.default_priority))?;
        Ok(())
    }

    pub fn blocking_permits(&self) -> usize {
        self.blocking_threads.unwrap_or(self.workers).max(1)
    }

    pub fn default_priority(&self) -> JobPriority {
        JobPriority::new(i64::from(self.default_priority)).unwrap_or_default()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_validation_errors)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn health_check_delay(&self) -> Duration {
        Duration::from_millis(self.health_check_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.blocking_permits(), 2);
        assert_eq!(config.default_priority().get(), 5);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(!config.enforce_timeouts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"workers": 4, "enforce_timeouts": true}"#).unwrap();
        assert_eq!(config.workers, 4);
        assert!(config.enforce_timeouts);
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.blocking_permits(), 4);
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let zero_workers = ManagerConfig {
            workers: 0,
            ..ManagerConfig::default()
        };
        assert!(zero_workers.validate().is_err());

        let bad_priority = ManagerConfig {
            default_priority: 11,
            ..ManagerConfig::default()
        };
        assert_eq!(
            bad_priority.validate().unwrap_err(),
            JobError::InvalidPriority(11)
        );

        let zero_timeout = ManagerConfig {
            default_timeout_seconds: 0,
            ..ManagerConfig::default()
        };
        assert_eq!(zero_timeout.validate().unwrap_err(), JobError::InvalidTimeout(0));

        let huge_timeout = ManagerConfig {
            default_timeout_seconds: u64::MAX,
            ..ManagerConfig::default()
        };
        assert_eq!(
            huge_timeout.validate().unwrap_err(),
            JobError::InvalidTimeout(u64::MAX)
        );

        for event_capacity in [0, MAX_EVENT_CAPACITY + 1, usize::MAX] {
            let config = ManagerConfig {
                event_capacity,
                ..ManagerConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(JobError::Validation(_))),
                "event_capacity {event_capacity}"
            );
        }
    }
}
