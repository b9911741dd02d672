use std::fmt;
use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::events::InProcEventBus;
use crate::manager::JobManager;
use crate::queue::{InMemoryPriorityQueue, TicketQueue};
use crate::search::SearchExecutor;

/// Builder for a [`JobManager`] with explicit dependencies.
///
/// The search executor is required. The queue and event bus default to the
/// in-memory implementations.
///
/// ```ignore
/// let manager = JobManagerBuilder::new(ManagerConfig::default())
///     .with_search_executor(Arc::new(SampleSearchExecutor))
///     .build()?;
/// manager.start().await?;
/// ```
pub struct JobManagerBuilder {
    config: ManagerConfig,
    search: Option<Arc<dyn SearchExecutor>>,
    queue: Option<Arc<dyn TicketQueue>>,
    events: Option<Arc<InProcEventBus>>,
}

impl fmt::Debug for JobManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("JobManagerBuilder");
        debug.field("config", &self.config);
        debug.field("search_set", &self.search.is_some());
        debug.field("queue_set", &self.queue.is_some());
        debug.field("events_set", &self.events.is_some());
        if let Some(search) = &self.search {
            debug.field("search_executor", &search.name());
        }
        debug.finish()
    }
}

impl JobManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            search: None,
            queue: None,
            events: None,
        }
    }

    /// Set the executor behind food-search jobs.
    pub fn with_search_executor(mut self, search: Arc<dyn SearchExecutor>) -> Self {
        self.search = Some(search);
        self
    }

    /// Replace the in-memory priority queue.
    pub fn with_queue(mut self, queue: Arc<dyn TicketQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Share an existing event bus.
    pub fn with_events(mut self, events: Arc<InProcEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the manager. Workers are not started until [`JobManager::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the search executor
    /// is missing.
    pub fn build(self) -> anyhow::Result<JobManager> {
        self.config.validate()?;
        let search = self
            .search
            .ok_or_else(|| anyhow::anyhow!("search executor dependency missing"))?;
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryPriorityQueue::new()));
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(InProcEventBus::new(self.config.event_capacity)));

        Ok(JobManager::new(self.config, search, queue, events))
    }
}
