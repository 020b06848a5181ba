//! Cleanup of a cancelled snapshot run.
//!
//! Compensation reads the checkpoint to find what the run started on the
//! content backend and undoes it: running operations are cancelled, objects
//! they already created are deleted, and a recorded snapshot is removed.
//! Every step is attempted even when an earlier one fails.

use crate::error::SnapshotError;
use snapshot_core::SnapshotCheckpoint;
use snapshot_core::content::{ContentClient, ContentError, Operation};
use snapshot_persistence::Storage;

/// Undo the backend effects recorded in a checkpoint.
pub struct Compensation<'a> {
    content: &'a dyn ContentClient,
    storage: &'a dyn Storage,
    checkpoint: &'a SnapshotCheckpoint,
    snapshot_uuid: Option<&'a str>,
}

impl<'a> Compensation<'a> {
    pub fn new(
        content: &'a dyn ContentClient,
        storage: &'a dyn Storage,
        checkpoint: &'a SnapshotCheckpoint,
        snapshot_uuid: Option<&'a str>,
    ) -> Self {
        Self {
            content,
            storage,
            checkpoint,
            snapshot_uuid,
        }
    }

    /// Run all cleanup steps.
    ///
    /// # Errors
    ///
    /// Returns the first failure after every step has been attempted.
    pub async fn run(&self) -> Result<(), SnapshotError> {
        let results = [
            self.cleanup_sync().await,
            self.cleanup_distribution().await,
            self.delete_snapshot().await,
        ];
        let mut first = None;
        for err in results.into_iter().filter_map(Result::err) {
            tracing::warn!(error = %err, "Snapshot cleanup step failed");
            first.get_or_insert(err);
        }
        first.map_or(Ok(()), Err)
    }

    /// Cancel an operation and return its latest state.
    async fn cancel(&self, href: &str) -> Result<Operation, ContentError> {
        self.content.cancel_operation(href).await?;
        self.content.get_operation(href).await
    }

    async fn cleanup_sync(&self) -> Result<(), SnapshotError> {
        let Some(sync_href) = self.checkpoint.sync_operation_ref.href() else {
            return Ok(());
        };
        let sync = self.cancel(sync_href).await?;

        if let Some(publication_href) = self.checkpoint.publication_operation_ref.href() {
            self.content.cancel_operation(publication_href).await?;
        }

        // Deleting the version also removes publications made from it.
        if let Some(version_href) = sync.version_href() {
            self.content.delete_repository_version(version_href).await?;
        }
        Ok(())
    }

    async fn cleanup_distribution(&self) -> Result<(), SnapshotError> {
        let Some(distribution_op) = self.checkpoint.distribution_operation_ref.href() else {
            return Ok(());
        };
        let operation = self.cancel(distribution_op).await?;
        if let Some(distribution_href) = operation.distribution_href() {
            self.content.delete_distribution(distribution_href).await?;
        }
        Ok(())
    }

    async fn delete_snapshot(&self) -> Result<(), SnapshotError> {
        if let Some(uuid) = self.snapshot_uuid {
            self.storage.delete_snapshot(uuid).await?;
        }
        Ok(())
    }
}
