use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// Decides whether a failed attempt may be retried.
///
/// The retry budget itself (`retry_count < max_retries`) is enforced by the
/// job record; this policy only classifies the failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Also retry failures caused by malformed job data.
    pub retry_validation_errors: bool,
}

impl RetryPolicy {
    pub fn new(retry_validation_errors: bool) -> Self {
        Self {
            retry_validation_errors,
        }
    }

    /// Retry every failure class while budget remains.
    pub fn uniform() -> Self {
        Self::new(true)
    }

    pub fn is_retryable(&self, error: &ExecutionError) -> bool {
        error.is_transient() || self.retry_validation_errors
    }
}
