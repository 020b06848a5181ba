//! Control-plane records read and written by the snapshot workflow.

use crate::counts::ContentCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository as configured by an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub org_id: String,
    /// Stable identifier; also names the backend remote and repository.
    pub uuid: String,
    pub url: String,
    pub name: String,
}

/// A finalized, immutable snapshot of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub uuid: String,
    pub version_href: String,
    pub publication_href: String,
    pub distribution_href: String,
    /// Path of the distribution inside the organization's domain.
    pub distribution_path: String,
    /// Distribution path prefixed with the domain name.
    pub repository_path: String,
    pub repository_configuration_uuid: String,
    pub counts: ContentCounts,
    pub created_at: DateTime<Utc>,
}

/// Distribution path of a snapshot: `<repository config uuid>/<snapshot identifier>`.
pub fn distribution_path(repository_config_uuid: &str, snapshot_identifier: &str) -> String {
    format!("{repository_config_uuid}/{snapshot_identifier}")
}

/// Path of a distribution as served, namespaced by domain.
pub fn repository_path(domain_name: &str, distribution_path: &str) -> String {
    format!(
        "{}/{}",
        domain_name.trim_end_matches('/'),
        distribution_path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_path() {
        assert_eq!(distribution_path("abc", "xyz"), "abc/xyz");
    }

    #[test]
    fn test_repository_path_joins_once() {
        assert_eq!(repository_path("domain-1", "abc/xyz"), "domain-1/abc/xyz");
        assert_eq!(repository_path("domain-1/", "/abc/xyz"), "domain-1/abc/xyz");
    }
}
