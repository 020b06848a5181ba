//! Error type of the snapshot workflow.

use snapshot_core::content::ContentError;
use snapshot_persistence::{QueueError, StorageError};
use uuid::Uuid;

/// Errors returned by a snapshot workflow run.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The task was cancelled while the workflow was waiting.
    #[error("snapshot task cancelled")]
    Cancelled,
    /// The task payload is not a valid checkpoint document.
    #[error("payload incorrect type for snapshot: {0}")]
    InvalidPayload(#[source] serde_json::Error),
    /// The task does not name a repository.
    #[error("task {0} has no repository")]
    MissingRepository(Uuid),
    #[error("repository configuration {uuid} not found for org {org_id}")]
    RepositoryConfigNotFound { org_id: String, uuid: String },
    /// A completed operation did not create the object it should have.
    #[error("could not find a {expected} href in operation {operation}")]
    MissingOperationResult {
        expected: &'static str,
        operation: String,
    },
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SnapshotError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SnapshotError::Cancelled)
    }
}
