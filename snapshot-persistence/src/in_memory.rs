//! In-memory implementations of [`Storage`] and [`TaskQueue`].
//!
//! These keep records in HashMaps behind `RwLock`s. Useful for testing and
//! as reference implementations.

use crate::backend::{Storage, StorageError};
use crate::queue::{QueueError, TaskQueue};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use snapshot_core::{RepositoryConfig, Snapshot, Task, TaskInfo, TaskStatus};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// In-memory control-plane store.
///
/// # Example
///
/// ```rust,ignore
/// use snapshot_persistence::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::new();
/// storage.insert_repository_config(config)?;
/// let repo = storage.fetch_repository_config("org-1", "abc").await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    repository_configs: Arc<RwLock<HashMap<(String, String), RepositoryConfig>>>, // Key: (org_id, uuid)
    snapshots: Arc<RwLock<HashMap<String, Snapshot>>>,
    domains: Arc<RwLock<HashMap<String, String>>>,
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("Lock error: {e}"))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a repository configuration.
    pub fn insert_repository_config(&self, config: RepositoryConfig) -> Result<(), StorageError> {
        let mut configs = self.repository_configs.write().map_err(lock_error)?;
        configs.insert((config.org_id.clone(), config.uuid.clone()), config);
        Ok(())
    }

    /// Look up a snapshot by uuid.
    pub fn snapshot(&self, uuid: &str) -> Result<Option<Snapshot>, StorageError> {
        let snapshots = self.snapshots.read().map_err(lock_error)?;
        Ok(snapshots.get(uuid).cloned())
    }

    pub fn snapshot_count(&self) -> Result<usize, StorageError> {
        Ok(self.snapshots.read().map_err(lock_error)?.len())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn fetch_repository_config(
        &self,
        org_id: &str,
        uuid: &str,
    ) -> Result<RepositoryConfig, StorageError> {
        let configs = self.repository_configs.read().map_err(lock_error)?;
        configs
            .get(&(org_id.to_string(), uuid.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("repository configuration {uuid}")))
    }

    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        let mut snapshots = self.snapshots.write().map_err(lock_error)?;
        if snapshots.contains_key(&snapshot.uuid) {
            return Err(StorageError::Backend(format!(
                "Snapshot {} already exists",
                snapshot.uuid
            )));
        }
        snapshots.insert(snapshot.uuid.clone(), snapshot);
        Ok(())
    }

    async fn delete_snapshot(&self, uuid: &str) -> Result<(), StorageError> {
        let mut snapshots = self.snapshots.write().map_err(lock_error)?;
        snapshots
            .remove(uuid)
            .ok_or_else(|| StorageError::NotFound(format!("snapshot {uuid}")))
            .map(|_| ())
    }

    async fn fetch_or_create_domain(&self, org_id: &str) -> Result<String, StorageError> {
        let mut domains = self.domains.write().map_err(lock_error)?;
        let name = domains.entry(org_id.to_string()).or_insert_with(|| {
            let id = Uuid::new_v4().simple().to_string();
            format!("cs-{}", &id[..8])
        });
        Ok(name.clone())
    }
}

#[derive(Default)]
struct QueueState {
    tasks: HashMap<Uuid, TaskInfo>,
    // Enqueue order, for FIFO dequeue.
    order: Vec<Uuid>,
    tokens: HashMap<Uuid, CancellationToken>,
}

/// In-memory task queue.
///
/// Payload updates are visible to every clone, so a handler that checkpoints
/// and then fails leaves its progress behind for the next attempt.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<RwLock<QueueState>>,
}

fn queue_lock_error(e: impl std::fmt::Display) -> QueueError {
    QueueError::Backend(format!("Lock error: {e}"))
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a finished task back into the pending state, keeping its payload.
    pub fn requeue(&self, id: Uuid) -> Result<TaskInfo, QueueError> {
        let mut state = self.state.write().map_err(queue_lock_error)?;
        let task = state.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        task.status = TaskStatus::Pending;
        task.error = None;
        task.cancel_requested = false;
        task.started_at = None;
        task.finished_at = None;
        let task = task.clone();
        state.tokens.insert(id, CancellationToken::new());
        Ok(task)
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, task: Task) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let mut state = self.state.write().map_err(queue_lock_error)?;
        state.tasks.insert(id, TaskInfo::new(id, task));
        state.order.push(id);
        state.tokens.insert(id, CancellationToken::new());
        Ok(id)
    }

    async fn dequeue(&self, task_types: &[String]) -> Result<Option<TaskInfo>, QueueError> {
        let mut state = self.state.write().map_err(queue_lock_error)?;
        let runnable = state.order.iter().copied().find(|id| {
            state.tasks.get(id).is_some_and(|task| {
                task.status == TaskStatus::Pending
                    && task_types.contains(&task.typename)
                    && task.dependencies.iter().all(|dep| {
                        state
                            .tasks
                            .get(dep)
                            .is_some_and(|d| d.status == TaskStatus::Completed)
                    })
            })
        });
        let Some(id) = runnable else {
            return Ok(None);
        };
        let task = state.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        Ok(Some(task.clone()))
    }

    async fn update_payload(
        &self,
        task: &TaskInfo,
        payload: Bytes,
    ) -> Result<TaskInfo, QueueError> {
        let mut state = self.state.write().map_err(queue_lock_error)?;
        let stored = state
            .tasks
            .get_mut(&task.id)
            .ok_or(QueueError::NotFound(task.id))?;
        if stored.status.is_terminal() {
            return Err(QueueError::InvalidState {
                id: task.id,
                status: stored.status,
            });
        }
        stored.payload = payload;
        Ok(stored.clone())
    }

    async fn status(&self, id: Uuid) -> Result<TaskInfo, QueueError> {
        let state = self.state.read().map_err(queue_lock_error)?;
        state.tasks.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }

    async fn finish(&self, id: Uuid, error: Option<String>) -> Result<(), QueueError> {
        let mut state = self.state.write().map_err(queue_lock_error)?;
        let task = state.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if task.status != TaskStatus::Running {
            return Err(QueueError::InvalidState {
                id,
                status: task.status,
            });
        }
        task.status = match (&error, task.cancel_requested) {
            (None, _) => TaskStatus::Completed,
            (Some(_), true) => TaskStatus::Canceled,
            (Some(_), false) => TaskStatus::Failed,
        };
        task.error = error;
        task.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn send_cancel_notification(&self, id: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.write().map_err(queue_lock_error)?;
        let task = state.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if task.status.is_terminal() {
            return Ok(());
        }
        task.cancel_requested = true;
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Canceled;
            task.finished_at = Some(Utc::now());
        }
        if let Some(token) = state.tokens.get(&id) {
            token.cancel();
        }
        Ok(())
    }

    async fn listen_for_cancel(&self, id: Uuid) -> Result<CancellationToken, QueueError> {
        let state = self.state.read().map_err(queue_lock_error)?;
        state.tokens.get(&id).cloned().ok_or(QueueError::NotFound(id))
    }
}
