use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forage::*;
use parking_lot::Mutex;

/// In-memory priority queue that can fail or panic on dequeue and records
/// the order tickets were handed out.
#[derive(Clone, Default)]
pub struct FlakyQueue {
    inner: Arc<InMemoryPriorityQueue>,
    failures_remaining: Arc<AtomicU32>,
    failures_served: Arc<AtomicU32>,
    panics_remaining: Arc<AtomicU32>,
    dequeued: Arc<Mutex<Vec<QueueTicket>>>,
}

impl FlakyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` dequeue calls.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Panic inside the next `count` dequeue calls.
    pub fn panic_next(&self, count: u32) {
        self.panics_remaining.store(count, Ordering::SeqCst);
    }

    pub fn failures_served(&self) -> u32 {
        self.failures_served.load(Ordering::SeqCst)
    }

    pub fn dequeued(&self) -> Vec<QueueTicket> {
        self.dequeued.lock().clone()
    }

    pub fn dequeued_ids(&self) -> Vec<JobId> {
        self.dequeued.lock().iter().map(|t| t.job_id).collect()
    }

    /// Tickets handed out for `job_id`, in dequeue order.
    pub fn tickets_for(&self, job_id: JobId) -> Vec<QueueTicket> {
        self.dequeued
            .lock()
            .iter()
            .filter(|t| t.job_id == job_id)
            .copied()
            .collect()
    }

    fn take_failure(&self) -> bool {
        take_one(&self.failures_remaining)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TicketQueue for FlakyQueue {
    fn enqueue(&self, priority: JobPriority, job_id: JobId) -> QueueTicket {
        self.inner.enqueue(priority, job_id)
    }

    async fn dequeue(&self, wait: Duration) -> anyhow::Result<Option<QueueTicket>> {
        if take_one(&self.panics_remaining) {
            panic!("simulated queue panic");
        }
        if self.take_failure() {
            self.failures_served.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("simulated queue outage");
        }
        let ticket = self.inner.dequeue(wait).await?;
        if let Some(ticket) = ticket {
            self.dequeued.lock().push(ticket);
        }
        Ok(ticket)
    }

    fn snapshot(&self) -> QueueSnapshot {
        self.inner.snapshot()
    }

    fn depth(&self) -> usize {
        self.inner.depth()
    }
}
