//! Task queue trait.
//!
//! The queue owns task lifecycle and durable payloads. Handlers only use it
//! to checkpoint their payload and to learn about cancellation.

use async_trait::async_trait;
use bytes::Bytes;
use snapshot_core::{Task, TaskInfo, TaskStatus};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Task not found.
    #[error("Task not found: {0}")]
    NotFound(Uuid),
    /// The task is in a state that does not allow the operation.
    #[error("Task {id} is {status:?}")]
    InvalidState { id: Uuid, status: TaskStatus },
    /// Backend-specific error.
    #[error("Queue error: {0}")]
    Backend(String),
}

/// Trait for a durable task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit a task; every call creates a new task with a fresh id.
    async fn enqueue(&self, task: Task) -> Result<Uuid, QueueError>;

    /// Claim the oldest runnable task of one of `task_types`.
    ///
    /// A task is runnable when it is pending and all of its dependencies
    /// have completed. The claimed task is marked running.
    async fn dequeue(&self, task_types: &[String]) -> Result<Option<TaskInfo>, QueueError>;

    /// Durably replace a task's payload and return the refreshed record.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidState` if the task already finished.
    async fn update_payload(&self, task: &TaskInfo, payload: Bytes)
    -> Result<TaskInfo, QueueError>;

    async fn status(&self, id: Uuid) -> Result<TaskInfo, QueueError>;

    /// Record the outcome of a running task. `None` means success.
    async fn finish(&self, id: Uuid, error: Option<String>) -> Result<(), QueueError>;

    /// Request cooperative cancellation of a task.
    ///
    /// A pending task is canceled immediately; a running task observes the
    /// request through its token from [`TaskQueue::listen_for_cancel`].
    async fn send_cancel_notification(&self, id: Uuid) -> Result<(), QueueError>;

    /// Token that fires when cancellation of `id` is requested.
    async fn listen_for_cancel(&self, id: Uuid) -> Result<CancellationToken, QueueError>;
}
