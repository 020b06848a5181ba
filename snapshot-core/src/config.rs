//! Snapshot workflow configuration.

use crate::model::RepositoryConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Organization id of the trusted first-party organization.
pub const DEFAULT_TRUSTED_ORG_ID: &str = "-1";
/// Host of the vendor content-delivery network.
pub const DEFAULT_CDN_DOMAIN: &str = "cdn.redhat.com";

const ENV_TRUSTED_ORG_ID: &str = "SNAPSHOT_TRUSTED_ORG_ID";
const ENV_CDN_DOMAIN: &str = "SNAPSHOT_CDN_DOMAIN";
const ENV_CDN_CERT_PAIR: &str = "SNAPSHOT_CDN_CERT_PAIR";
const ENV_CA_CERT_PATH: &str = "SNAPSHOT_CA_CERT_PATH";

/// Client certificate material used to fetch from the vendor CDN.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// PEM certificate and key in one string.
    pub cdn_cert_pair: Option<String>,
    /// PEM CA bundle. Takes precedence over `ca_cert_path`.
    pub ca_cert: Option<String>,
    pub ca_cert_path: Option<PathBuf>,
}

/// Settings read by the snapshot workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub trusted_org_id: String,
    pub cdn_domain: String,
    pub certs: CertificateConfig,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            trusted_org_id: DEFAULT_TRUSTED_ORG_ID.to_string(),
            cdn_domain: DEFAULT_CDN_DOMAIN.to_string(),
            certs: CertificateConfig::default(),
        }
    }
}

/// Certificates attached to a backend remote.
///
/// The client pair is absent when no pair is configured; the CA is always
/// sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCertificates {
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub ca_cert: String,
}

impl SnapshotConfig {
    /// Read overrides from `SNAPSHOT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read overrides through a custom key lookup.
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(org) = get_env(ENV_TRUSTED_ORG_ID) {
            config.trusted_org_id = org;
        }
        if let Some(domain) = get_env(ENV_CDN_DOMAIN) {
            config.cdn_domain = domain;
        }
        config.certs.cdn_cert_pair = get_env(ENV_CDN_CERT_PAIR);
        config.certs.ca_cert_path = get_env(ENV_CA_CERT_PATH).map(PathBuf::from);
        config
    }

    #[must_use]
    pub fn with_trusted_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.trusted_org_id = org_id.into();
        self
    }

    #[must_use]
    pub fn with_cdn_domain(mut self, domain: impl Into<String>) -> Self {
        self.cdn_domain = domain.into();
        self
    }

    #[must_use]
    pub fn with_certs(mut self, certs: CertificateConfig) -> Self {
        self.certs = certs;
        self
    }

    /// Whether the URL points at the vendor CDN.
    pub fn is_cdn_url(&self, url: &str) -> bool {
        url.contains(&self.cdn_domain)
    }

    /// Certificates to attach to the remote of `repo`, if any.
    ///
    /// Only repositories of the trusted organization that point at the vendor
    /// CDN get certificates. A CA bundle that cannot be read is logged and
    /// sent as an empty string.
    pub fn remote_certificates(&self, repo: &RepositoryConfig) -> Option<RemoteCertificates> {
        if repo.org_id != self.trusted_org_id || !self.is_cdn_url(&repo.url) {
            return None;
        }
        let pair = self.certs.cdn_cert_pair.clone();
        if pair.is_none() {
            tracing::warn!(repository = %repo.uuid, "No CDN certificate pair configured");
        }
        Some(RemoteCertificates {
            client_cert: pair.clone(),
            client_key: pair,
            ca_cert: self.load_ca(),
        })
    }

    fn load_ca(&self) -> String {
        if let Some(ca) = &self.certs.ca_cert {
            return ca.clone();
        }
        let Some(path) = &self.certs.ca_cert_path else {
            return String::new();
        };
        match std::fs::read_to_string(path) {
            Ok(ca) => ca,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Cannot load CA file");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(org_id: &str, url: &str) -> RepositoryConfig {
        RepositoryConfig {
            org_id: org_id.to_string(),
            uuid: "abc".to_string(),
            url: url.to_string(),
            name: "repo".to_string(),
        }
    }

    fn config() -> SnapshotConfig {
        SnapshotConfig::default().with_certs(CertificateConfig {
            cdn_cert_pair: Some("PAIR".to_string()),
            ca_cert: Some("CA".to_string()),
            ca_cert_path: None,
        })
    }

    #[test]
    fn test_trusted_org_on_cdn_gets_certificates() {
        let certs = config()
            .remote_certificates(&repo("-1", "https://cdn.redhat.com/content/dist/"))
            .unwrap();
        assert_eq!(certs.client_cert.as_deref(), Some("PAIR"));
        assert_eq!(certs.client_key.as_deref(), Some("PAIR"));
        assert_eq!(certs.ca_cert, "CA");
    }

    #[test]
    fn test_other_org_or_url_gets_nothing() {
        let config = config();
        assert!(
            config
                .remote_certificates(&repo("1234", "https://cdn.redhat.com/content/"))
                .is_none()
        );
        assert!(
            config
                .remote_certificates(&repo("-1", "https://example.com/repo/"))
                .is_none()
        );
    }

    #[test]
    fn test_unreadable_ca_file_yields_empty_string() {
        let config = SnapshotConfig::default().with_certs(CertificateConfig {
            cdn_cert_pair: Some("PAIR".to_string()),
            ca_cert: None,
            ca_cert_path: Some(PathBuf::from("/nonexistent/ca.pem")),
        });
        let certs = config
            .remote_certificates(&repo("-1", "https://cdn.redhat.com/x/"))
            .unwrap();
        assert_eq!(certs.ca_cert, "");
    }

    #[test]
    fn test_deserialize_uses_defaults() {
        let config: SnapshotConfig =
            serde_json::from_str(r#"{"certs": {"cdn_cert_pair": "P"}}"#).unwrap();
        assert_eq!(config.trusted_org_id, DEFAULT_TRUSTED_ORG_ID);
        assert_eq!(config.cdn_domain, DEFAULT_CDN_DOMAIN);
        assert_eq!(config.certs.cdn_cert_pair.as_deref(), Some("P"));
    }

    #[test]
    fn test_missing_pair_attaches_only_ca() {
        let config = SnapshotConfig::default().with_certs(CertificateConfig {
            cdn_cert_pair: None,
            ca_cert: Some("CA".to_string()),
            ca_cert_path: None,
        });
        let certs = config
            .remote_certificates(&repo("-1", "https://cdn.redhat.com/x/"))
            .unwrap();
        assert!(certs.client_cert.is_none());
        assert!(certs.client_key.is_none());
        assert_eq!(certs.ca_cert, "CA");
    }

    #[test]
    fn test_from_env_with_overrides() {
        let env = std::collections::HashMap::from([
            ("SNAPSHOT_TRUSTED_ORG_ID", "42"),
            ("SNAPSHOT_CDN_DOMAIN", "cdn.example.com"),
            ("SNAPSHOT_CDN_CERT_PAIR", "PAIR"),
            ("SNAPSHOT_CA_CERT_PATH", "/etc/ca.pem"),
        ]);
        let config = SnapshotConfig::from_env_with(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.trusted_org_id, "42");
        assert_eq!(config.cdn_domain, "cdn.example.com");
        assert_eq!(config.certs.cdn_cert_pair.as_deref(), Some("PAIR"));
        assert_eq!(config.certs.ca_cert_path, Some(PathBuf::from("/etc/ca.pem")));
        assert!(config.is_cdn_url("https://cdn.example.com/content/"));
    }

    #[test]
    fn test_from_env_with_nothing_set_uses_defaults() {
        let config = SnapshotConfig::from_env_with(|_| None);
        assert_eq!(config.trusted_org_id, DEFAULT_TRUSTED_ORG_ID);
        assert_eq!(config.cdn_domain, DEFAULT_CDN_DOMAIN);
        assert!(config.certs.cdn_cert_pair.is_none());
        assert!(config.certs.ca_cert_path.is_none());
    }

    #[test]
    fn test_custom_cdn_domain() {
        let config = config().with_cdn_domain("cdn.example.com");
        assert!(
            config
                .remote_certificates(&repo("-1", "https://cdn.redhat.com/content/"))
                .is_none()
        );
        assert!(
            config
                .remote_certificates(&repo("-1", "https://cdn.example.com/content/"))
                .is_some()
        );
    }
}
