use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::worker::{run_worker, WorkerConfig, WorkerContext};

/// Token for signaling graceful shutdown to workers.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed set of worker tasks sharing one shutdown token.
///
/// Workers finish the job they hold before observing shutdown; nothing
/// interrupts an in-flight attempt.
pub struct WorkerPool {
    shutdown_token: ShutdownToken,
    shutdown_timeout: Duration,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let worker_count = self
            .worker_handles
            .try_lock()
            .map(|handles| handles.len())
            .unwrap_or_default();

        f.debug_struct("WorkerPool")
            .field("worker_count", &worker_count)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_token: ShutdownToken::new(),
            shutdown_timeout,
            worker_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown_token.clone()
    }

    pub async fn worker_count(&self) -> usize {
        self.worker_handles.lock().await.len()
    }

    /// Spawn one worker task per config.
    pub(crate) async fn spawn_workers(
        &self,
        context: Arc<WorkerContext>,
        configs: impl IntoIterator<Item = WorkerConfig>,
    ) {
        let mut handles = self.worker_handles.lock().await;
        for config in configs {
            let ctx = Arc::clone(&context);
            let shutdown = self.shutdown_token.clone();
            handles.push(tokio::spawn(async move {
                run_worker(config, ctx, shutdown).await;
            }));
        }
    }

    /// Signal shutdown and wait for every worker to exit.
    ///
    /// Each worker gets `shutdown_timeout` to finish its current job; a worker
    /// that overruns is abandoned with a warning.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();

        let handles = {
            let mut guard = self.worker_handles.lock().await;
            std::mem::take(&mut *guard)
        };

        for handle in handles {
            match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Worker task failed: {:?}", e),
                Err(_) => {
                    tracing::warn!("Worker task timed out during shutdown")
                }
            }
        }
    }
}
