//! Content backend contract.
//!
//! The snapshot workflow drives a content-management backend that exposes
//! remotes, repositories, publications and distributions, and performs its
//! slow work as asynchronous operations. The workflow only relies on the
//! trigger / poll / cancel contract of those operations; the polling cadence
//! belongs to the client.
//!
//! # Architecture
//!
//! - **ContentConnector**: hands out clients bound to one backend domain.
//! - **ContentClient**: the per-domain API consumed by the workflow.
//! - **InMemoryContentBackend**: a reference implementation that applies
//!   operations in memory, records every call, and can hold operations
//!   open so tests can observe resumption and cancellation.

mod in_memory;

pub use in_memory::{ContentCall, InMemoryContentBackend, InMemoryContentClient, OperationKind};

use crate::config::RemoteCertificates;
use crate::counts::ContentSummary;
use crate::model::RepositoryConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Error type for content backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// The request never got a response.
    #[error("content backend request failed: {0}")]
    Transport(String),
    /// The backend answered with an error status.
    #[error("content backend returned {status}: {message}")]
    Http { status: u16, message: String },
    /// The referenced object does not exist.
    #[error("content object not found: {0}")]
    NotFound(String),
    /// An asynchronous operation finished in the failed state.
    #[error("operation {href} failed: {reason}")]
    OperationFailed { href: String, reason: String },
    /// An asynchronous operation was canceled on the backend.
    #[error("operation {0} was canceled")]
    OperationCanceled(String),
}

/// State of a backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Waiting,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Canceled
        )
    }
}

/// An asynchronous backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub href: String,
    pub state: OperationState,
    /// Hrefs of objects the operation created.
    pub created_resources: Vec<String>,
    pub error: Option<String>,
}

impl Operation {
    fn select(&self, marker: &str) -> Option<&str> {
        self.created_resources
            .iter()
            .find(|href| href.contains(marker))
            .map(String::as_str)
    }

    /// Repository version created by a sync operation.
    pub fn version_href(&self) -> Option<&str> {
        self.select("/versions/")
    }

    /// Publication created by a publish operation.
    pub fn publication_href(&self) -> Option<&str> {
        self.select("/publications/")
    }

    /// Distribution created by a distribute operation.
    pub fn distribution_href(&self) -> Option<&str> {
        self.select("/distributions/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub href: String,
    pub name: String,
    pub url: String,
}

/// Desired state of a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    pub name: String,
    pub url: String,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub ca_cert: Option<String>,
}

impl RemoteSpec {
    /// Remote for a repository configuration, with optional certificates.
    pub fn for_repository(repo: &RepositoryConfig, certs: Option<RemoteCertificates>) -> Self {
        let (client_cert, client_key, ca_cert) = match certs {
            Some(certs) => (certs.client_cert, certs.client_key, Some(certs.ca_cert)),
            None => (None, None, None),
        };
        Self {
            name: repo.uuid.clone(),
            url: repo.url.clone(),
            client_cert,
            client_key,
            ca_cert,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub href: String,
    pub name: String,
    pub remote: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryVersion {
    pub href: String,
    pub number: u64,
    pub content_summary: Option<ContentSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub href: String,
    pub repository_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub href: String,
    pub name: String,
    pub base_path: String,
    pub publication: Option<String>,
}

/// Hands out content clients bound to a domain.
pub trait ContentConnector: Send + Sync {
    fn connect(&self, domain_name: &str) -> Arc<dyn ContentClient>;
}

/// Content backend API, scoped to one domain.
///
/// Methods that start asynchronous work return the href of the created
/// operation; use [`ContentClient::poll_operation`] to wait for it.
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Ensure the domain exists and return its href.
    async fn lookup_or_create_domain(&self, name: &str) -> Result<String, ContentError>;

    /// Bring the domain's settings up to date.
    async fn update_domain_if_needed(&self, name: &str) -> Result<(), ContentError>;

    async fn get_remote_by_name(&self, name: &str) -> Result<Option<Remote>, ContentError>;

    async fn create_remote(&self, spec: &RemoteSpec) -> Result<Remote, ContentError>;

    /// Overwrite a remote; returns the update operation href.
    async fn update_remote(&self, href: &str, spec: &RemoteSpec) -> Result<String, ContentError>;

    async fn get_repository_by_name(&self, name: &str)
    -> Result<Option<Repository>, ContentError>;

    async fn create_repository(
        &self,
        name: &str,
        remote_href: Option<&str>,
    ) -> Result<Repository, ContentError>;

    /// Start a sync; a `None` remote syncs from the repository's own remote.
    async fn sync_repository(
        &self,
        repository_href: &str,
        remote_href: Option<&str>,
    ) -> Result<String, ContentError>;

    async fn find_publication_by_version(
        &self,
        version_href: &str,
    ) -> Result<Option<Publication>, ContentError>;

    async fn create_publication(&self, version_href: &str) -> Result<String, ContentError>;

    async fn find_distribution_by_path(
        &self,
        base_path: &str,
    ) -> Result<Option<Distribution>, ContentError>;

    async fn create_distribution(
        &self,
        publication_href: &str,
        name: &str,
        base_path: &str,
    ) -> Result<String, ContentError>;

    async fn get_operation(&self, href: &str) -> Result<Operation, ContentError>;

    /// Request cancellation; returns the operation as it stands afterwards.
    async fn cancel_operation(&self, href: &str) -> Result<Operation, ContentError>;

    /// Wait until the operation reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` or `OperationCanceled` when the operation
    /// ends in those states.
    async fn poll_operation(&self, href: &str) -> Result<Operation, ContentError>;

    async fn get_repository_version(&self, href: &str)
    -> Result<RepositoryVersion, ContentError>;

    async fn delete_repository_version(&self, href: &str) -> Result<String, ContentError>;

    async fn delete_distribution(&self, href: &str) -> Result<String, ContentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(created_resources: &[&str]) -> Operation {
        Operation {
            href: "/api/tasks/1/".to_string(),
            state: OperationState::Completed,
            created_resources: created_resources.iter().map(ToString::to_string).collect(),
            error: None,
        }
    }

    #[test]
    fn test_selectors_pick_by_resource_kind() {
        let op = operation(&[
            "/api/d/publications/rpm/7/",
            "/api/d/repositories/rpm/3/versions/2/",
            "/api/d/distributions/rpm/9/",
        ]);
        assert_eq!(op.version_href(), Some("/api/d/repositories/rpm/3/versions/2/"));
        assert_eq!(op.publication_href(), Some("/api/d/publications/rpm/7/"));
        assert_eq!(op.distribution_href(), Some("/api/d/distributions/rpm/9/"));
    }

    #[test]
    fn test_selectors_return_none_without_resources() {
        let op = operation(&[]);
        assert!(op.version_href().is_none());
        assert!(op.publication_href().is_none());
        assert!(op.distribution_href().is_none());
    }

    #[test]
    fn test_remote_spec_without_certificates() {
        let repo = RepositoryConfig {
            org_id: "1".to_string(),
            uuid: "abc".to_string(),
            url: "https://example.com/".to_string(),
            name: "example".to_string(),
        };
        let spec = RemoteSpec::for_repository(&repo, None);
        assert_eq!(spec.name, "abc");
        assert!(spec.client_cert.is_none());
        assert!(spec.client_key.is_none());
        assert!(spec.ca_cert.is_none());
    }

    #[test]
    fn test_remote_spec_with_ca_only() {
        let repo = RepositoryConfig {
            org_id: "-1".to_string(),
            uuid: "abc".to_string(),
            url: "https://cdn.redhat.com/content/".to_string(),
            name: "example".to_string(),
        };
        let certs = RemoteCertificates {
            client_cert: None,
            client_key: None,
            ca_cert: "CA".to_string(),
        };
        let spec = RemoteSpec::for_repository(&repo, Some(certs));
        assert!(spec.client_cert.is_none());
        assert!(spec.client_key.is_none());
        assert_eq!(spec.ca_cert.as_deref(), Some("CA"));
    }
}
