//! Pooled worker that drains the task queue.
//!
//! A worker polls the queue for task types it has handlers for, runs each
//! claimed task inside a span carrying the task id, type and request id, and
//! records the outcome. Several workers may poll the same queue; the queue
//! guarantees each task is claimed once.
//!
//! # Example
//!
//! ```rust,ignore
//! use snapshot_runtime::{SnapshotHandler, TaskWorker};
//!
//! let worker = TaskWorker::new("worker-1", queue.clone())
//!     .with_handler(REPOSITORY_SNAPSHOT_TASK, Arc::new(handler))
//!     .with_poll_interval(Duration::from_secs(1));
//!
//! worker.start_polling(shutdown).await?;
//! ```

use crate::handler::TaskHandler;
use snapshot_core::TaskInfo;
use snapshot_persistence::TaskQueue;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A worker that claims and runs tasks from a shared queue.
#[derive(Clone)]
pub struct TaskWorker {
    worker_id: String,
    queue: Arc<dyn TaskQueue>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    poll_interval: Duration,
    max_concurrency: NonZeroUsize,
}

impl TaskWorker {
    pub fn new(worker_id: impl Into<String>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            handlers: HashMap::new(),
            poll_interval: Duration::from_secs(1),
            max_concurrency: NonZeroUsize::MIN,
        }
    }

    /// Route tasks of `task_type` to `handler`.
    #[must_use]
    pub fn with_handler(
        mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        self.handlers.insert(task_type.into(), handler);
        self
    }

    /// How long to wait between polls of an empty queue (default: 1s).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the maximum number of tasks run at once (default: 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Task types this worker has handlers for.
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Claim and run one task, if any is available.
    ///
    /// Returns `false` when the queue had nothing to run.
    ///
    /// # Errors
    ///
    /// Returns an error only when the queue itself fails. Handler failures
    /// are recorded on the task.
    pub async fn process_next(&self) -> anyhow::Result<bool> {
        let Some(task) = self.queue.dequeue(&self.task_types()).await? else {
            return Ok(false);
        };
        self.execute_task(task).await?;
        Ok(true)
    }

    /// Run a claimed task and record its outcome.
    pub async fn execute_task(&self, task: TaskInfo) -> anyhow::Result<()> {
        let span = tracing::info_span!(
            "task",
            task_id = %task.id,
            task_type = %task.typename,
            request_id = %task.request_id,
        );
        let id = task.id;
        let result = async {
            let Some(handler) = self.handlers.get(&task.typename).cloned() else {
                return Err(anyhow::anyhow!("no handler for task type {}", task.typename));
            };
            let cancel = self.queue.listen_for_cancel(id).await?;
            tracing::debug!(worker_id = %self.worker_id, "Running task");
            handler.handle(task, cancel).await
        }
        .instrument(span.clone())
        .await;

        let error = match result {
            Ok(()) => {
                span.in_scope(|| tracing::info!("Task completed"));
                None
            }
            Err(e) => {
                span.in_scope(|| tracing::error!(error = %e, "Task failed"));
                Some(e.to_string())
            }
        };
        self.queue.finish(id, error).await?;
        Ok(())
    }

    /// Poll for tasks until `shutdown` fires.
    ///
    /// Tasks already running when `shutdown` fires are left to finish in
    /// the background.
    pub async fn start_polling(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.get()));
        let worker = Arc::new(self);
        let task_types = worker.task_types();
        let mut interval = time::interval(worker.poll_interval);

        loop {
            let permit = tokio::select! {
                () = shutdown.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit?,
            };

            match worker.queue.dequeue(&task_types).await? {
                Some(task) => {
                    let worker = Arc::clone(&worker);
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = worker.execute_task(task).await {
                            tracing::error!(
                                worker_id = %worker.worker_id,
                                error = %e,
                                "Failed to record task outcome"
                            );
                        }
                    });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                }
            }
        }

        tracing::info!(worker_id = %worker.worker_id, "Worker stopped");
        Ok(())
    }
}
