//! Queued units of work.
//!
//! A [`Task`] is what callers submit; a [`TaskInfo`] is the queue's record of
//! it, including the payload the running handler checkpoints into.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Task type of the repository snapshot workflow.
pub const REPOSITORY_SNAPSHOT_TASK: &str = "snapshot";

/// A request to queue work.
#[derive(Debug, Clone, Default)]
pub struct Task {
    /// Task type, used to route the task to a handler.
    pub typename: String,
    /// Handler-specific payload.
    pub payload: Bytes,
    /// Tasks that must complete before this one is dequeued.
    pub dependencies: Vec<Uuid>,
    pub org_id: String,
    pub repository_uuid: Option<Uuid>,
    /// Correlation id of the request that produced the task.
    pub request_id: String,
}

impl Task {
    /// A snapshot task for the given repository configuration.
    pub fn repository_snapshot(
        org_id: impl Into<String>,
        repository_uuid: Uuid,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            typename: REPOSITORY_SNAPSHOT_TASK.to_string(),
            payload: Bytes::from_static(b"{}"),
            dependencies: Vec::new(),
            org_id: org_id.into(),
            repository_uuid: Some(repository_uuid),
            request_id: request_id.into(),
        }
    }
}

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

/// The queue's record of a task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Uuid,
    pub typename: String,
    pub payload: Bytes,
    pub dependencies: Vec<Uuid>,
    pub org_id: String,
    pub repository_uuid: Option<Uuid>,
    pub request_id: String,
    pub status: TaskStatus,
    /// Failure message of a failed task.
    pub error: Option<String>,
    /// Set when cancellation was requested, even if the task already ran.
    pub cancel_requested: bool,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// Create a pending record for a submitted task.
    pub fn new(id: Uuid, task: Task) -> Self {
        Self {
            id,
            typename: task.typename,
            payload: task.payload,
            dependencies: task.dependencies,
            org_id: task.org_id,
            repository_uuid: task.repository_uuid,
            request_id: task.request_id,
            status: TaskStatus::Pending,
            error: None,
            cancel_requested: false,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}
