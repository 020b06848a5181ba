//! Storage trait for control-plane records.
//!
//! This trait abstracts the relational store the snapshot workflow reads
//! repository configurations from and writes finalized snapshots to.

use async_trait::async_trait;
use snapshot_core::{RepositoryConfig, Snapshot};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Backend-specific error.
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Trait for the control-plane store.
///
/// # Example
///
/// ```rust,ignore
/// use snapshot_persistence::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::new();
/// let domain = storage.fetch_or_create_domain("org-1").await?;
/// let repo = storage.fetch_repository_config("org-1", "abc").await?;
/// ```
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch a repository configuration owned by `org_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the organization has no repository
    /// configuration with this uuid.
    async fn fetch_repository_config(
        &self,
        org_id: &str,
        uuid: &str,
    ) -> Result<RepositoryConfig, StorageError>;

    /// Persist a finalized snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if a snapshot with the same uuid exists.
    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError>;

    /// Delete a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no snapshot exists for the uuid.
    async fn delete_snapshot(&self, uuid: &str) -> Result<(), StorageError>;

    /// Return the backend domain name of an organization, assigning one on
    /// first use.
    async fn fetch_or_create_domain(&self, org_id: &str) -> Result<String, StorageError>;
}
