use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::{JobId, JobPriority, JobType};

/// Metadata envelope attached to every job event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: u16,
    pub event_id: Uuid,
    pub idempotency_key: String,
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(job_id: JobId, idempotency_key: impl Into<String>) -> Self {
        Self {
            version: 1,
            event_id: Uuid::now_v7(),
            idempotency_key: idempotency_key.into(),
            job_id,
            timestamp: Utc::now(),
        }
    }
}

/// Job lifecycle event with metadata and payload.
#[derive(Clone, Debug)]
pub struct JobEvent {
    pub meta: EventMeta,
    pub payload: JobEventPayload,
}

impl JobEvent {
    pub fn new(job_id: JobId, payload: JobEventPayload) -> Self {
        let key = format!("{}-{}", payload.name(), job_id);
        Self {
            meta: EventMeta::new(job_id, key),
            payload,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.meta.job_id
    }
}

/// Event payload emitted for job lifecycle transitions.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum JobEventPayload {
    /// Job record stored.
    Created {
        job_type: JobType,
        priority: JobPriority,
    },
    /// A worker moved the job to running.
    Started { attempt: u32, worker_id: String },
    /// The executing handler reported progress.
    Progress {
        attempt: u32,
        percentage: f64,
        step_description: String,
    },
    /// Job finished with a result.
    Completed { attempt: u32 },
    /// Attempt failed and the job went back to pending.
    Retrying { next_attempt: u32, error: String },
    /// Job failed for good.
    Failed {
        attempt: u32,
        error: String,
        retryable: bool,
    },
    /// Job cancelled while pending.
    Cancelled,
}

impl JobEventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            JobEventPayload::Created { .. } => "created",
            JobEventPayload::Started { .. } => "started",
            JobEventPayload::Progress { .. } => "progress",
            JobEventPayload::Completed { .. } => "completed",
            JobEventPayload::Retrying { .. } => "retrying",
            JobEventPayload::Failed { .. } => "failed",
            JobEventPayload::Cancelled => "cancelled",
        }
    }
}

/// Largest per-subscriber buffer an [`InProcEventBus`] will allocate.
pub const MAX_EVENT_CAPACITY: usize = 1 << 20;

/// In-process event bus using a tokio broadcast channel.
///
/// Publishing never waits for subscribers. A subscriber that falls more than
/// `capacity` events behind receives `RecvError::Lagged` and skips ahead.
/// With no subscribers, events are dropped.
pub struct InProcEventBus {
    sender: broadcast::Sender<JobEvent>,
    capacity: usize,
}

impl std::fmt::Debug for InProcEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl InProcEventBus {
    /// Create a bus buffering at most `capacity` events per subscriber.
    ///
    /// `capacity` is clamped to `1..=MAX_EVENT_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_EVENT_CAPACITY);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}
