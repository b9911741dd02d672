use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::job::{JobId, JobPriority};

/// A (priority, id) pair waiting for a worker.
///
/// The ticket only refers to the job; the record itself stays in the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QueueTicket {
    pub priority: JobPriority,
    pub job_id: JobId,
    /// Insertion order, used to keep equal priorities FIFO.
    pub sequence: u64,
}

// Max-heap order: most urgent priority first, then earliest insertion.
impl Ord for QueueTicket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueTicket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered handoff of pending job ids to workers.
///
/// `enqueue` is infallible: the backlog is unbounded. `dequeue` waits at most
/// `wait` and may fail for backend reasons, which workers treat as
/// infrastructure errors.
#[async_trait]
pub trait TicketQueue: Send + Sync {
    /// Add a ticket for `job_id`.
    fn enqueue(&self, priority: JobPriority, job_id: JobId) -> QueueTicket;

    /// Take the most urgent ticket, waiting up to `wait` for one to arrive.
    async fn dequeue(&self, wait: Duration) -> anyhow::Result<Option<QueueTicket>>;

    /// Snapshot of the current backlog.
    fn snapshot(&self) -> QueueSnapshot;

    /// Number of tickets waiting.
    fn depth(&self) -> usize {
        self.snapshot().depth
    }
}

/// Snapshot of queue state at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Timestamp when the snapshot was taken.
    pub sampled_at: DateTime<Utc>,
    /// Total tickets waiting.
    pub depth: usize,
    /// Tickets waiting per priority value.
    pub by_priority: BTreeMap<u8, usize>,
}

impl QueueSnapshot {
    pub fn new(sampled_at: DateTime<Utc>) -> Self {
        Self {
            sampled_at,
            depth: 0,
            by_priority: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct HeapState {
    heap: BinaryHeap<QueueTicket>,
    next_sequence: u64,
}

/// Binary-heap backed [`TicketQueue`].
#[derive(Debug, Default)]
pub struct InMemoryPriorityQueue {
    state: Mutex<HeapState>,
    available: Notify,
}

impl InMemoryPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop without waiting.
    pub fn try_dequeue(&self) -> Option<QueueTicket> {
        self.state.lock().heap.pop()
    }
}

#[async_trait]
impl TicketQueue for InMemoryPriorityQueue {
    fn enqueue(&self, priority: JobPriority, job_id: JobId) -> QueueTicket {
        let ticket = {
            let mut state = self.state.lock();
            let ticket = QueueTicket {
                priority,
                job_id,
                sequence: state.next_sequence,
            };
            state.next_sequence += 1;
            state.heap.push(ticket);
            ticket
        };
        self.available.notify_one();
        ticket
    }

    async fn dequeue(&self, wait: Duration) -> anyhow::Result<Option<QueueTicket>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            // Register interest before checking so an enqueue in between is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(ticket) = self.try_dequeue() {
                return Ok(Some(ticket));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_dequeue());
            }
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        let mut snapshot = QueueSnapshot::new(Utc::now());
        snapshot.depth = state.heap.len();
        for ticket in state.heap.iter() {
            *snapshot.by_priority.entry(ticket.priority.get()).or_default() += 1;
        }
        snapshot
    }

    fn depth(&self) -> usize {
        self.state.lock().heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn priority(value: i64) -> JobPriority {
        JobPriority::new(value).unwrap()
    }

    #[tokio::test]
    async fn higher_priority_dequeues_first() {
        let queue = InMemoryPriorityQueue::new();
        let a = JobId::new();
        let b = JobId::new();

        queue.enqueue(priority(1), a);
        queue.enqueue(priority(9), b);

        let first = queue.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = queue.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.job_id, b);
        assert_eq!(second.job_id, a);
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let queue = InMemoryPriorityQueue::new();
        let ids: Vec<JobId> = (0..5).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.enqueue(priority(5), *id);
        }
        queue.enqueue(priority(6), JobId::new());

        let urgent = queue.try_dequeue().unwrap();
        assert_eq!(urgent.priority, priority(6));
        for id in &ids {
            assert_eq!(queue.try_dequeue().unwrap().job_id, *id);
        }
        assert!(queue.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = InMemoryPriorityQueue::new();
        let started = tokio::time::Instant::now();
        let ticket = queue.dequeue(Duration::from_millis(30)).await.unwrap();
        assert!(ticket.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn waiting_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(InMemoryPriorityQueue::new());
        let id = JobId::new();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(priority(3), id);

        let ticket = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("dequeue should wake promptly")
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(ticket.job_id, id);
    }

    #[test]
    fn snapshot_counts_by_priority() {
        let queue = InMemoryPriorityQueue::new();
        queue.enqueue(priority(2), JobId::new());
        queue.enqueue(priority(2), JobId::new());
        queue.enqueue(priority(8), JobId::new());

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.depth, 3);
        assert_eq!(snapshot.by_priority.get(&2), Some(&2));
        assert_eq!(snapshot.by_priority.get(&8), Some(&1));
        assert_eq!(queue.depth(), 3);
    }
}
