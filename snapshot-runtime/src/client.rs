//! Submitting and cancelling tasks.

use async_trait::async_trait;
use snapshot_core::Task;
use snapshot_persistence::{QueueError, TaskQueue};
use std::sync::Arc;
use uuid::Uuid;

/// Client side of the task queue.
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Submit a task and return its id. Every call creates a new task.
    async fn enqueue(&self, task: Task) -> Result<Uuid, QueueError>;

    /// Ask the worker running `id` to stop. Pending tasks are canceled
    /// without running.
    async fn send_cancel_notification(&self, id: Uuid) -> Result<(), QueueError>;
}

/// [`TaskClient`] backed by a [`TaskQueue`].
#[derive(Clone)]
pub struct QueueTaskClient {
    queue: Arc<dyn TaskQueue>,
}

impl QueueTaskClient {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl TaskClient for QueueTaskClient {
    async fn enqueue(&self, task: Task) -> Result<Uuid, QueueError> {
        let typename = task.typename.clone();
        let request_id = task.request_id.clone();
        let id = self.queue.enqueue(task).await?;
        tracing::debug!(task_id = %id, task_type = %typename, request_id = %request_id, "Task enqueued");
        Ok(id)
    }

    async fn send_cancel_notification(&self, id: Uuid) -> Result<(), QueueError> {
        self.queue.send_cancel_notification(id).await?;
        tracing::debug!(task_id = %id, "Cancel notification sent");
        Ok(())
    }
}
