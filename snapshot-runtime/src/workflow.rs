//! Resumable repository snapshot workflow.
//!
//! The workflow drives the content backend through remote, repository,
//! sync, publication and distribution, then records a [`Snapshot`]. Each
//! step that starts backend work checks the checkpoint first, triggers only
//! if nothing was triggered before, and persists the checkpoint through the
//! queue before it waits on the operation. A worker that dies mid-wait
//! therefore resumes by polling the stored operation instead of starting a
//! new one.

use crate::error::SnapshotError;
use chrono::Utc;
use snapshot_core::content::{ContentClient, Operation, RemoteSpec};
use snapshot_core::model::{distribution_path, repository_path};
use snapshot_core::{
    ContentCounts, RepositoryConfig, Snapshot, SnapshotCheckpoint, SnapshotConfig, TaskInfo,
};
use snapshot_persistence::{Storage, StorageError, TaskQueue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of a successful workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// A new snapshot was recorded.
    Created(Snapshot),
    /// The sync produced no new repository version; nothing was recorded.
    Unchanged,
}

/// Collaborators a workflow run talks to.
#[derive(Clone)]
pub struct Backends {
    /// Content client bound to the organization's domain.
    pub content: Arc<dyn ContentClient>,
    pub storage: Arc<dyn Storage>,
    pub queue: Arc<dyn TaskQueue>,
    pub config: Arc<SnapshotConfig>,
}

/// One run of the snapshot workflow for one task delivery.
pub struct SnapshotRepository {
    org_id: String,
    domain_name: String,
    repository_uuid: String,
    backends: Backends,
    task: TaskInfo,
    checkpoint: SnapshotCheckpoint,
    cancel: CancellationToken,
    snapshot_uuid: Option<String>,
}

impl SnapshotRepository {
    /// Prepare a run for `task`, resuming from `checkpoint`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::MissingRepository` if the task names no
    /// repository.
    pub fn new(
        task: TaskInfo,
        checkpoint: SnapshotCheckpoint,
        domain_name: String,
        backends: Backends,
        cancel: CancellationToken,
    ) -> Result<Self, SnapshotError> {
        let repository_uuid = task
            .repository_uuid
            .ok_or(SnapshotError::MissingRepository(task.id))?;
        Ok(Self {
            org_id: task.org_id.clone(),
            domain_name,
            repository_uuid: repository_uuid.to_string(),
            backends,
            task,
            checkpoint,
            cancel,
            snapshot_uuid: None,
        })
    }

    pub fn checkpoint(&self) -> &SnapshotCheckpoint {
        &self.checkpoint
    }

    /// The task as last returned by the queue.
    pub fn task(&self) -> &TaskInfo {
        &self.task
    }

    /// Run the workflow to completion.
    ///
    /// When the run ends because the task was cancelled, backend artifacts
    /// created by this workflow are cleaned up before the cancellation error
    /// is returned. Cleanup failures are logged only.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step unchanged.
    pub async fn run(&mut self) -> Result<SnapshotOutcome, SnapshotError> {
        let result = self.run_steps().await;
        if let Err(err) = &result
            && err.is_cancelled()
            && let Err(cleanup_err) = self.cleanup_on_cancel().await
        {
            tracing::error!(error = %cleanup_err, "Error cleaning up canceled snapshot");
        }
        result
    }

    async fn cleanup_on_cancel(&self) -> Result<(), SnapshotError> {
        crate::compensation::Compensation::new(
            self.backends.content.as_ref(),
            self.backends.storage.as_ref(),
            &self.checkpoint,
            self.snapshot_uuid.as_deref(),
        )
        .run()
        .await
    }

    async fn run_steps(&mut self) -> Result<SnapshotOutcome, SnapshotError> {
        let content = Arc::clone(&self.backends.content);
        content.lookup_or_create_domain(&self.domain_name).await?;
        content.update_domain_if_needed(&self.domain_name).await?;

        let repo_config = self.lookup_repository_config().await?;
        let remote_href = self.find_or_create_remote(&repo_config).await?;
        let repo_href = self
            .find_or_create_repository(&repo_config.uuid, &remote_href)
            .await?;

        let Some(version_href) = self.sync_repository(&repo_href).await? else {
            tracing::info!("Repository content unchanged, no snapshot needed");
            return Ok(SnapshotOutcome::Unchanged);
        };

        let publication_href = self.find_or_create_publication(&version_href).await?;
        let snapshot_ident = self
            .checkpoint
            .snapshot_identifier_or_generate()
            .to_string();
        let (distribution_href, distribution_path) = self
            .create_distribution(&publication_href, &repo_config.uuid, &snapshot_ident)
            .await?;
        let counts = self.content_counts(&version_href).await?;

        let snapshot = Snapshot {
            uuid: Uuid::new_v4().to_string(),
            version_href,
            publication_href,
            distribution_href,
            repository_path: repository_path(&self.domain_name, &distribution_path),
            distribution_path,
            repository_configuration_uuid: repo_config.uuid,
            counts,
            created_at: Utc::now(),
        };
        tracing::debug!(path = %snapshot.distribution_path, "Snapshot created");
        self.backends.storage.create_snapshot(snapshot.clone()).await?;
        self.snapshot_uuid = Some(snapshot.uuid.clone());
        Ok(SnapshotOutcome::Created(snapshot))
    }

    fn ensure_not_cancelled(&self) -> Result<(), SnapshotError> {
        if self.cancel.is_cancelled() {
            Err(SnapshotError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait for an operation, giving up as soon as the task is cancelled.
    async fn wait_for(&self, href: &str) -> Result<Operation, SnapshotError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SnapshotError::Cancelled),
            result = self.backends.content.poll_operation(href) => Ok(result?),
        }
    }

    /// Persist the checkpoint as the task payload.
    async fn update_payload(&mut self) -> Result<(), SnapshotError> {
        let payload = self
            .checkpoint
            .to_payload()
            .map_err(SnapshotError::InvalidPayload)?;
        self.task = self
            .backends
            .queue
            .update_payload(&self.task, payload)
            .await?;
        Ok(())
    }

    async fn lookup_repository_config(&self) -> Result<RepositoryConfig, SnapshotError> {
        match self
            .backends
            .storage
            .fetch_repository_config(&self.org_id, &self.repository_uuid)
            .await
        {
            Ok(config) => Ok(config),
            Err(StorageError::NotFound(_)) => Err(SnapshotError::RepositoryConfigNotFound {
                org_id: self.org_id.clone(),
                uuid: self.repository_uuid.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_or_create_remote(&self, repo: &RepositoryConfig) -> Result<String, SnapshotError> {
        let content = &self.backends.content;
        let spec = RemoteSpec::for_repository(repo, self.backends.config.remote_certificates(repo));
        match content.get_remote_by_name(&repo.uuid).await? {
            None => Ok(content.create_remote(&spec).await?.href),
            Some(remote) => {
                // Remotes are cheap to overwrite; always push the current settings.
                content.update_remote(&remote.href, &spec).await?;
                Ok(remote.href)
            }
        }
    }

    async fn find_or_create_repository(
        &self,
        name: &str,
        remote_href: &str,
    ) -> Result<String, SnapshotError> {
        let content = &self.backends.content;
        if let Some(repository) = content.get_repository_by_name(name).await? {
            return Ok(repository.href);
        }
        Ok(content.create_repository(name, Some(remote_href)).await?.href)
    }

    /// Sync the repository. Returns the new version href, or `None` when
    /// the content did not change.
    async fn sync_repository(&mut self, repo_href: &str) -> Result<Option<String>, SnapshotError> {
        let sync_href = if let Some(href) = self.checkpoint.sync_operation_ref.href() {
            tracing::debug!(operation = href, "Resuming sync operation");
            href.to_string()
        } else {
            self.ensure_not_cancelled()?;
            let href = self.backends.content.sync_repository(repo_href, None).await?;
            self.checkpoint.sync_operation_ref.trigger(href.clone());
            self.update_payload().await?;
            href
        };

        let operation = self.wait_for(&sync_href).await?;
        Ok(operation.version_href().map(ToString::to_string))
    }

    async fn find_or_create_publication(
        &mut self,
        version_href: &str,
    ) -> Result<String, SnapshotError> {
        if let Some(publication) = self
            .backends
            .content
            .find_publication_by_version(version_href)
            .await?
        {
            return Ok(publication.href);
        }

        let publication_op = if let Some(href) = self.checkpoint.publication_operation_ref.href() {
            tracing::debug!(operation = href, "Resuming publication operation");
            href.to_string()
        } else {
            self.ensure_not_cancelled()?;
            let href = self.backends.content.create_publication(version_href).await?;
            self.checkpoint.publication_operation_ref.trigger(href.clone());
            self.update_payload().await?;
            href
        };

        let operation = self.wait_for(&publication_op).await?;
        operation
            .publication_href()
            .map(ToString::to_string)
            .ok_or(SnapshotError::MissingOperationResult {
                expected: "publication",
                operation: operation.href.clone(),
            })
    }

    /// Distribute the publication at `<repo uuid>/<snapshot ident>`.
    /// Returns the distribution href and path.
    async fn create_distribution(
        &mut self,
        publication_href: &str,
        repo_config_uuid: &str,
        snapshot_ident: &str,
    ) -> Result<(String, String), SnapshotError> {
        let dist_path = distribution_path(repo_config_uuid, snapshot_ident);

        match self
            .backends
            .content
            .find_distribution_by_path(&dist_path)
            .await
        {
            Ok(Some(found)) => return Ok((found.href, dist_path)),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(path = %dist_path, error = %e, "Error looking up distribution by path");
            }
        }

        let distribution_op = if let Some(href) = self.checkpoint.distribution_operation_ref.href() {
            tracing::debug!(operation = href, "Resuming distribution operation");
            href.to_string()
        } else {
            self.ensure_not_cancelled()?;
            let href = self
                .backends
                .content
                .create_distribution(publication_href, snapshot_ident, &dist_path)
                .await?;
            self.checkpoint.distribution_operation_ref.trigger(href.clone());
            self.update_payload().await?;
            href
        };

        let operation = self.wait_for(&distribution_op).await?;
        let dist_href = operation.distribution_href().ok_or_else(|| {
            SnapshotError::MissingOperationResult {
                expected: "distribution",
                operation: operation.href.clone(),
            }
        })?;
        Ok((dist_href.to_string(), dist_path))
    }

    async fn content_counts(&self, version_href: &str) -> Result<ContentCounts, SnapshotError> {
        let version = self
            .backends
            .content
            .get_repository_version(version_href)
            .await?;
        if version.content_summary.is_none() {
            tracing::error!(version = version_href, "Found nil content summary for version");
        }
        Ok(ContentCounts::from_summary(version.content_summary.as_ref()))
    }
}
