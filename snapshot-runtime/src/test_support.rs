//! Shared fixtures for runtime tests.

use crate::workflow::{Backends, SnapshotRepository};
use snapshot_core::content::{ContentCall, ContentConnector, InMemoryContentBackend};
use snapshot_core::{
    REPOSITORY_SNAPSHOT_TASK, RepositoryConfig, SnapshotCheckpoint, SnapshotConfig, Task,
    TaskInfo,
};
use snapshot_persistence::{InMemoryQueue, InMemoryStorage, Storage, TaskQueue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub(crate) const ORG_ID: &str = "org-1";
pub(crate) const UPSTREAM: &str = "https://example.com/repo/";

/// In-memory backends plus one registered repository configuration.
pub(crate) struct Harness {
    pub content: InMemoryContentBackend,
    pub storage: InMemoryStorage,
    pub queue: InMemoryQueue,
    pub config: SnapshotConfig,
    pub repo: RepositoryConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_repository(ORG_ID, UPSTREAM)
    }

    pub fn with_repository(org_id: &str, url: &str) -> Self {
        let content = InMemoryContentBackend::new();
        content.set_upstream(url, &[("rpm", 3), ("erratum", 1)]);
        let storage = InMemoryStorage::new();
        let repo = RepositoryConfig {
            org_id: org_id.to_string(),
            uuid: Uuid::new_v4().to_string(),
            url: url.to_string(),
            name: "example".to_string(),
        };
        storage.insert_repository_config(repo.clone()).unwrap();
        Self {
            content,
            storage,
            queue: InMemoryQueue::new(),
            config: SnapshotConfig::default(),
            repo,
        }
    }

    pub fn repository_uuid(&self) -> Uuid {
        self.repo.uuid.parse().unwrap()
    }

    pub async fn domain(&self) -> String {
        self.storage
            .fetch_or_create_domain(&self.repo.org_id)
            .await
            .unwrap()
    }

    pub async fn enqueue(&self) -> Uuid {
        self.queue
            .enqueue(Task::repository_snapshot(
                self.repo.org_id.clone(),
                self.repository_uuid(),
                "req-1",
            ))
            .await
            .unwrap()
    }

    pub async fn claim(&self) -> TaskInfo {
        self.queue
            .dequeue(&[REPOSITORY_SNAPSHOT_TASK.to_string()])
            .await
            .unwrap()
            .expect("a queued task")
    }

    pub async fn backends(&self) -> Backends {
        Backends {
            content: self.content.connect(&self.domain().await),
            storage: Arc::new(self.storage.clone()),
            queue: Arc::new(self.queue.clone()),
            config: Arc::new(self.config.clone()),
        }
    }

    /// A workflow for `task`, resuming from its stored payload.
    pub async fn workflow(&self, task: TaskInfo) -> SnapshotRepository {
        let checkpoint = SnapshotCheckpoint::from_payload(&task.payload).unwrap();
        let cancel = self.queue.listen_for_cancel(task.id).await.unwrap();
        SnapshotRepository::new(
            task,
            checkpoint,
            self.domain().await,
            self.backends().await,
            cancel,
        )
        .unwrap()
    }

    pub async fn checkpoint(&self, id: Uuid) -> SnapshotCheckpoint {
        let task = self.queue.status(id).await.unwrap();
        SnapshotCheckpoint::from_payload(&task.payload).unwrap()
    }

    /// Wait until the stored checkpoint of `id` satisfies `done`.
    pub async fn wait_for_checkpoint(
        &self,
        id: Uuid,
        done: impl Fn(&SnapshotCheckpoint) -> bool,
    ) -> SnapshotCheckpoint {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let checkpoint = self.checkpoint(id).await;
                if done(&checkpoint) {
                    return checkpoint;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("checkpoint never reached the expected state")
    }

    /// Wait until the content backend recorded `count` calls matching
    /// `predicate`.
    pub async fn wait_for_calls(&self, count: usize, predicate: impl Fn(&ContentCall) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.content.count_calls(&predicate) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend never saw the expected calls");
    }
}
