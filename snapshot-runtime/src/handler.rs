//! Task handlers.

use crate::error::SnapshotError;
use crate::workflow::{Backends, SnapshotOutcome, SnapshotRepository};
use async_trait::async_trait;
use snapshot_core::content::ContentConnector;
use snapshot_core::{SnapshotCheckpoint, SnapshotConfig, TaskInfo};
use snapshot_persistence::{Storage, TaskQueue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs one type of task.
///
/// `cancel` fires when cancellation of the task is requested. Handlers are
/// expected to stop waiting, clean up, and return an error.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: TaskInfo, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Handler of repository snapshot tasks.
#[derive(Clone)]
pub struct SnapshotHandler {
    connector: Arc<dyn ContentConnector>,
    storage: Arc<dyn Storage>,
    queue: Arc<dyn TaskQueue>,
    config: Arc<SnapshotConfig>,
}

impl SnapshotHandler {
    pub fn new(
        connector: Arc<dyn ContentConnector>,
        storage: Arc<dyn Storage>,
        queue: Arc<dyn TaskQueue>,
        config: SnapshotConfig,
    ) -> Self {
        Self {
            connector,
            storage,
            queue,
            config: Arc::new(config),
        }
    }

    /// Run the snapshot workflow for `task`.
    ///
    /// # Errors
    ///
    /// Fails before touching the content backend when the payload is not a
    /// checkpoint document; otherwise returns the workflow's error.
    pub async fn run_task(
        &self,
        task: TaskInfo,
        cancel: CancellationToken,
    ) -> Result<SnapshotOutcome, SnapshotError> {
        let checkpoint =
            SnapshotCheckpoint::from_payload(&task.payload).map_err(SnapshotError::InvalidPayload)?;
        if !checkpoint.is_fresh() {
            tracing::debug!("Resuming snapshot from stored progress");
        }

        let domain_name = self.storage.fetch_or_create_domain(&task.org_id).await?;
        let backends = Backends {
            content: self.connector.connect(&domain_name),
            storage: Arc::clone(&self.storage),
            queue: Arc::clone(&self.queue),
            config: Arc::clone(&self.config),
        };
        SnapshotRepository::new(task, checkpoint, domain_name, backends, cancel)?
            .run()
            .await
    }
}

#[async_trait]
impl TaskHandler for SnapshotHandler {
    async fn handle(&self, task: TaskInfo, cancel: CancellationToken) -> anyhow::Result<()> {
        match self.run_task(task, cancel).await? {
            SnapshotOutcome::Created(snapshot) => {
                tracing::info!(snapshot = %snapshot.uuid, path = %snapshot.distribution_path, "Snapshot recorded");
            }
            SnapshotOutcome::Unchanged => {}
        }
        Ok(())
    }
}
