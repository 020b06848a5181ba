//! In-memory implementation of the content backend.
//!
//! Operations are applied as soon as they are triggered unless their kind is
//! held, in which case they stay `Running` until released or canceled. Every
//! client call is recorded so tests can assert what the workflow did.

use super::{
    ContentClient, ContentConnector, ContentError, Distribution, Operation, OperationState,
    Publication, Remote, RemoteSpec, Repository, RepositoryVersion,
};
use crate::counts::{ContentSummary, ContentTypeMetadata};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Kinds of asynchronous operations the backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Sync,
    Publish,
    Distribute,
    Delete,
    UpdateRemote,
}

/// A recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentCall {
    LookupOrCreateDomain(String),
    UpdateDomainIfNeeded(String),
    GetRemote(String),
    CreateRemote(RemoteSpec),
    UpdateRemote {
        href: String,
        spec: RemoteSpec,
    },
    GetRepository(String),
    CreateRepository {
        name: String,
        remote: Option<String>,
    },
    Sync(String),
    FindPublication(String),
    CreatePublication(String),
    FindDistribution(String),
    CreateDistribution {
        publication: String,
        name: String,
        base_path: String,
    },
    GetOperation(String),
    CancelOperation(String),
    PollOperation(String),
    GetVersion(String),
    DeleteVersion(String),
    DeleteDistribution(String),
}

enum Effect {
    Sync {
        repository: String,
        remote: Option<String>,
    },
    Publish {
        version: String,
    },
    Distribute {
        publication: String,
        name: String,
        base_path: String,
    },
    DeleteVersion(String),
    DeleteDistribution(String),
    UpdateRemote {
        href: String,
        spec: RemoteSpec,
    },
}

impl Effect {
    fn kind(&self) -> OperationKind {
        match self {
            Effect::Sync { .. } => OperationKind::Sync,
            Effect::Publish { .. } => OperationKind::Publish,
            Effect::Distribute { .. } => OperationKind::Distribute,
            Effect::DeleteVersion(_) | Effect::DeleteDistribution(_) => OperationKind::Delete,
            Effect::UpdateRemote { .. } => OperationKind::UpdateRemote,
        }
    }
}

struct PendingOperation {
    operation: Operation,
    prefix: String,
    kind: OperationKind,
    effect: Option<Effect>,
}

struct StoredRemote {
    remote: Remote,
    spec: RemoteSpec,
}

struct StoredVersion {
    version: RepositoryVersion,
    repository: String,
    counts: BTreeMap<String, i64>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    domains: BTreeMap<String, String>,
    remotes: HashMap<String, StoredRemote>,
    repositories: HashMap<String, Repository>,
    versions: HashMap<String, StoredVersion>,
    publications: HashMap<String, Publication>,
    distributions: HashMap<String, Distribution>,
    operations: HashMap<String, PendingOperation>,
    // Content available at each upstream URL, by content type.
    upstream: HashMap<String, BTreeMap<String, i64>>,
    held: HashSet<OperationKind>,
    calls: Vec<ContentCall>,
}

impl State {
    fn next_href(&mut self, prefix: &str, collection: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{collection}/{}/", self.next_id)
    }

    fn start(&mut self, prefix: &str, effect: Effect) -> String {
        let href = self.next_href(prefix, "tasks");
        let kind = effect.kind();
        let pending = PendingOperation {
            operation: Operation {
                href: href.clone(),
                state: OperationState::Running,
                created_resources: Vec::new(),
                error: None,
            },
            prefix: prefix.to_string(),
            kind,
            effect: Some(effect),
        };
        self.operations.insert(href.clone(), pending);
        if !self.held.contains(&kind) {
            self.complete(&href);
        }
        href
    }

    fn complete(&mut self, href: &str) {
        let Some((prefix, effect)) = self
            .operations
            .get_mut(href)
            .and_then(|op| Some((op.prefix.clone(), op.effect.take()?)))
        else {
            return;
        };
        let result = self.apply(&prefix, effect);
        if let Some(pending) = self.operations.get_mut(href) {
            match result {
                Ok(created) => {
                    pending.operation.state = OperationState::Completed;
                    pending.operation.created_resources = created;
                }
                Err(reason) => {
                    pending.operation.state = OperationState::Failed;
                    pending.operation.error = Some(reason);
                }
            }
        }
    }

    fn latest_version(&self, repository: &str) -> Option<&StoredVersion> {
        self.versions
            .values()
            .filter(|v| v.repository == repository)
            .max_by_key(|v| v.version.number)
    }

    fn apply(&mut self, prefix: &str, effect: Effect) -> Result<Vec<String>, String> {
        match effect {
            Effect::Sync { repository, remote } => self.apply_sync(&repository, remote),
            Effect::Publish { version } => {
                if !self.versions.contains_key(&version) {
                    return Err(format!("repository version {version} not found"));
                }
                let href = self.next_href(prefix, "publications/rpm");
                self.publications.insert(
                    href.clone(),
                    Publication {
                        href: href.clone(),
                        repository_version: version,
                    },
                );
                Ok(vec![href])
            }
            Effect::Distribute {
                publication,
                name,
                base_path,
            } => {
                if !self.publications.contains_key(&publication) {
                    return Err(format!("publication {publication} not found"));
                }
                let taken = self
                    .distributions
                    .values()
                    .any(|d| d.href.starts_with(prefix) && d.base_path == base_path);
                if taken {
                    return Err(format!("base_path {base_path} must be unique"));
                }
                let href = self.next_href(prefix, "distributions/rpm");
                self.distributions.insert(
                    href.clone(),
                    Distribution {
                        href: href.clone(),
                        name,
                        base_path,
                        publication: Some(publication),
                    },
                );
                Ok(vec![href])
            }
            Effect::DeleteVersion(href) => {
                self.versions.remove(&href);
                self.publications.retain(|_, p| p.repository_version != href);
                Ok(Vec::new())
            }
            Effect::DeleteDistribution(href) => {
                self.distributions.remove(&href);
                Ok(Vec::new())
            }
            Effect::UpdateRemote { href, spec } => {
                let stored = self
                    .remotes
                    .get_mut(&href)
                    .ok_or_else(|| format!("remote {href} not found"))?;
                stored.remote.url = spec.url.clone();
                stored.spec = spec;
                Ok(Vec::new())
            }
        }
    }

    fn apply_sync(
        &mut self,
        repository: &str,
        remote: Option<String>,
    ) -> Result<Vec<String>, String> {
        let repo = self
            .repositories
            .get(repository)
            .ok_or_else(|| format!("repository {repository} not found"))?;
        let remote = remote
            .or_else(|| repo.remote.clone())
            .ok_or_else(|| format!("repository {repository} has no remote"))?;
        let url = &self
            .remotes
            .get(&remote)
            .ok_or_else(|| format!("remote {remote} not found"))?
            .remote
            .url;
        let upstream = self.upstream.get(url).cloned().unwrap_or_default();
        let (previous, number) = match self.latest_version(repository) {
            Some(latest) => (latest.counts.clone(), latest.version.number + 1),
            None => (BTreeMap::new(), 1),
        };
        if previous == upstream {
            return Ok(Vec::new());
        }

        let href = format!("{repository}versions/{number}/");
        let summary = ContentSummary {
            present: to_section(upstream.iter().map(|(t, c)| (t, *c))),
            added: to_section(
                upstream
                    .iter()
                    .map(|(t, c)| (t, c - previous.get(t).copied().unwrap_or(0))),
            ),
            removed: to_section(
                previous
                    .iter()
                    .map(|(t, c)| (t, c - upstream.get(t).copied().unwrap_or(0))),
            ),
        };
        self.versions.insert(
            href.clone(),
            StoredVersion {
                version: RepositoryVersion {
                    href: href.clone(),
                    number,
                    content_summary: Some(summary),
                },
                repository: repository.to_string(),
                counts: upstream,
            },
        );
        Ok(vec![href])
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_section<'a>(
    counts: impl Iterator<Item = (&'a String, i64)>,
) -> HashMap<String, ContentTypeMetadata> {
    counts
        .filter(|(_, count)| *count > 0)
        .map(|(content_type, count)| {
            let mut metadata = ContentTypeMetadata::new();
            metadata.insert("count".to_string(), serde_json::json!(count as f64));
            (content_type.clone(), metadata)
        })
        .collect()
}

/// In-memory content backend shared by all domain clients.
///
/// # Example
///
/// ```rust,ignore
/// let backend = InMemoryContentBackend::new();
/// backend.set_upstream("https://example.com/repo/", &[("rpm", 3)]);
/// let client = backend.client("domain-1");
/// ```
#[derive(Clone)]
pub struct InMemoryContentBackend {
    state: Arc<Mutex<State>>,
    changed: Arc<watch::Sender<u64>>,
}

impl Default for InMemoryContentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryContentBackend {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            changed: Arc::new(changed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }

    /// A client bound to `domain_name`.
    pub fn client(&self, domain_name: &str) -> InMemoryContentClient {
        InMemoryContentClient {
            domain: domain_name.to_string(),
            backend: self.clone(),
        }
    }

    /// Set the content served at an upstream URL.
    pub fn set_upstream(&self, url: &str, counts: &[(&str, i64)]) {
        self.lock().upstream.insert(
            url.to_string(),
            counts.iter().map(|(t, c)| ((*t).to_string(), *c)).collect(),
        );
    }

    /// Keep newly triggered operations of `kind` running until released.
    pub fn hold(&self, kind: OperationKind) {
        self.lock().held.insert(kind);
    }

    /// Complete all running operations of `kind` and stop holding it.
    pub fn release(&self, kind: OperationKind) {
        {
            let mut state = self.lock();
            state.held.remove(&kind);
            let running: Vec<String> = state
                .operations
                .values()
                .filter(|op| op.kind == kind && !op.operation.state.is_terminal())
                .map(|op| op.operation.href.clone())
                .collect();
            for href in running {
                state.complete(&href);
            }
        }
        self.notify();
    }

    pub fn calls(&self) -> Vec<ContentCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&ContentCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn operation(&self, href: &str) -> Option<Operation> {
        self.lock().operations.get(href).map(|op| op.operation.clone())
    }

    /// Current desired state of the remote named `name`.
    pub fn remote_spec(&self, name: &str) -> Option<RemoteSpec> {
        self.lock()
            .remotes
            .values()
            .find(|r| r.remote.name == name)
            .map(|r| r.spec.clone())
    }

    pub fn version_exists(&self, href: &str) -> bool {
        self.lock().versions.contains_key(href)
    }

    pub fn version_count(&self) -> usize {
        self.lock().versions.len()
    }

    pub fn distributions(&self) -> Vec<Distribution> {
        self.lock().distributions.values().cloned().collect()
    }

    pub fn publications(&self) -> Vec<Publication> {
        self.lock().publications.values().cloned().collect()
    }

    /// Drop the content summary of a version, as an older backend would.
    pub fn clear_content_summary(&self, href: &str) {
        if let Some(stored) = self.lock().versions.get_mut(href) {
            stored.version.content_summary = None;
        }
    }
}

impl ContentConnector for InMemoryContentBackend {
    fn connect(&self, domain_name: &str) -> Arc<dyn ContentClient> {
        Arc::new(self.client(domain_name))
    }
}

/// Domain-bound client of an [`InMemoryContentBackend`].
#[derive(Clone)]
pub struct InMemoryContentClient {
    domain: String,
    backend: InMemoryContentBackend,
}

impl InMemoryContentClient {
    fn prefix(&self) -> String {
        format!("/api/content/{}/", self.domain)
    }

    fn record(&self, call: ContentCall) -> MutexGuard<'_, State> {
        let mut state = self.backend.lock();
        state.calls.push(call);
        state
    }

    fn start(&self, call: ContentCall, effect: Effect) -> String {
        let href = {
            let mut state = self.record(call);
            state.start(&self.prefix(), effect)
        };
        self.backend.notify();
        href
    }
}

#[async_trait]
impl ContentClient for InMemoryContentClient {
    async fn lookup_or_create_domain(&self, name: &str) -> Result<String, ContentError> {
        let mut state = self.record(ContentCall::LookupOrCreateDomain(name.to_string()));
        let href = format!("/api/content/default/domains/{name}/");
        Ok(state
            .domains
            .entry(name.to_string())
            .or_insert(href)
            .clone())
    }

    async fn update_domain_if_needed(&self, name: &str) -> Result<(), ContentError> {
        let state = self.record(ContentCall::UpdateDomainIfNeeded(name.to_string()));
        if state.domains.contains_key(name) {
            Ok(())
        } else {
            Err(ContentError::NotFound(format!("domain {name}")))
        }
    }

    async fn get_remote_by_name(&self, name: &str) -> Result<Option<Remote>, ContentError> {
        let state = self.record(ContentCall::GetRemote(name.to_string()));
        let prefix = self.prefix();
        Ok(state
            .remotes
            .values()
            .find(|r| r.remote.href.starts_with(&prefix) && r.remote.name == name)
            .map(|r| r.remote.clone()))
    }

    async fn create_remote(&self, spec: &RemoteSpec) -> Result<Remote, ContentError> {
        let mut state = self.record(ContentCall::CreateRemote(spec.clone()));
        let prefix = self.prefix();
        if state
            .remotes
            .values()
            .any(|r| r.remote.href.starts_with(&prefix) && r.remote.name == spec.name)
        {
            return Err(ContentError::Http {
                status: 400,
                message: format!("remote {} already exists", spec.name),
            });
        }
        let href = state.next_href(&prefix, "remotes/rpm");
        let remote = Remote {
            href: href.clone(),
            name: spec.name.clone(),
            url: spec.url.clone(),
        };
        state.remotes.insert(
            href,
            StoredRemote {
                remote: remote.clone(),
                spec: spec.clone(),
            },
        );
        Ok(remote)
    }

    async fn update_remote(&self, href: &str, spec: &RemoteSpec) -> Result<String, ContentError> {
        if !self.backend.lock().remotes.contains_key(href) {
            return Err(ContentError::NotFound(href.to_string()));
        }
        Ok(self.start(
            ContentCall::UpdateRemote {
                href: href.to_string(),
                spec: spec.clone(),
            },
            Effect::UpdateRemote {
                href: href.to_string(),
                spec: spec.clone(),
            },
        ))
    }

    async fn get_repository_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Repository>, ContentError> {
        let state = self.record(ContentCall::GetRepository(name.to_string()));
        let prefix = self.prefix();
        Ok(state
            .repositories
            .values()
            .find(|r| r.href.starts_with(&prefix) && r.name == name)
            .cloned())
    }

    async fn create_repository(
        &self,
        name: &str,
        remote_href: Option<&str>,
    ) -> Result<Repository, ContentError> {
        let mut state = self.record(ContentCall::CreateRepository {
            name: name.to_string(),
            remote: remote_href.map(ToString::to_string),
        });
        let href = state.next_href(&self.prefix(), "repositories/rpm");
        let repository = Repository {
            href: href.clone(),
            name: name.to_string(),
            remote: remote_href.map(ToString::to_string),
        };
        state.repositories.insert(href, repository.clone());
        Ok(repository)
    }

    async fn sync_repository(
        &self,
        repository_href: &str,
        remote_href: Option<&str>,
    ) -> Result<String, ContentError> {
        if !self.backend.lock().repositories.contains_key(repository_href) {
            return Err(ContentError::NotFound(repository_href.to_string()));
        }
        Ok(self.start(
            ContentCall::Sync(repository_href.to_string()),
            Effect::Sync {
                repository: repository_href.to_string(),
                remote: remote_href.map(ToString::to_string),
            },
        ))
    }

    async fn find_publication_by_version(
        &self,
        version_href: &str,
    ) -> Result<Option<Publication>, ContentError> {
        let state = self.record(ContentCall::FindPublication(version_href.to_string()));
        Ok(state
            .publications
            .values()
            .find(|p| p.repository_version == version_href)
            .cloned())
    }

    async fn create_publication(&self, version_href: &str) -> Result<String, ContentError> {
        Ok(self.start(
            ContentCall::CreatePublication(version_href.to_string()),
            Effect::Publish {
                version: version_href.to_string(),
            },
        ))
    }

    async fn find_distribution_by_path(
        &self,
        base_path: &str,
    ) -> Result<Option<Distribution>, ContentError> {
        let state = self.record(ContentCall::FindDistribution(base_path.to_string()));
        let prefix = self.prefix();
        Ok(state
            .distributions
            .values()
            .find(|d| d.href.starts_with(&prefix) && d.base_path == base_path)
            .cloned())
    }

    async fn create_distribution(
        &self,
        publication_href: &str,
        name: &str,
        base_path: &str,
    ) -> Result<String, ContentError> {
        Ok(self.start(
            ContentCall::CreateDistribution {
                publication: publication_href.to_string(),
                name: name.to_string(),
                base_path: base_path.to_string(),
            },
            Effect::Distribute {
                publication: publication_href.to_string(),
                name: name.to_string(),
                base_path: base_path.to_string(),
            },
        ))
    }

    async fn get_operation(&self, href: &str) -> Result<Operation, ContentError> {
        let state = self.record(ContentCall::GetOperation(href.to_string()));
        state
            .operations
            .get(href)
            .map(|op| op.operation.clone())
            .ok_or_else(|| ContentError::NotFound(href.to_string()))
    }

    async fn cancel_operation(&self, href: &str) -> Result<Operation, ContentError> {
        let operation = {
            let mut state = self.record(ContentCall::CancelOperation(href.to_string()));
            let pending = state
                .operations
                .get_mut(href)
                .ok_or_else(|| ContentError::NotFound(href.to_string()))?;
            if !pending.operation.state.is_terminal() {
                pending.effect = None;
                pending.operation.state = OperationState::Canceled;
            }
            pending.operation.clone()
        };
        self.backend.notify();
        Ok(operation)
    }

    async fn poll_operation(&self, href: &str) -> Result<Operation, ContentError> {
        self.backend
            .lock()
            .calls
            .push(ContentCall::PollOperation(href.to_string()));
        let mut changed = self.backend.changed.subscribe();
        loop {
            let operation = self
                .backend
                .lock()
                .operations
                .get(href)
                .map(|op| op.operation.clone())
                .ok_or_else(|| ContentError::NotFound(href.to_string()))?;
            match operation.state {
                OperationState::Completed => return Ok(operation),
                OperationState::Failed => {
                    return Err(ContentError::OperationFailed {
                        href: operation.href,
                        reason: operation.error.unwrap_or_default(),
                    });
                }
                OperationState::Canceled => {
                    return Err(ContentError::OperationCanceled(operation.href));
                }
                OperationState::Waiting | OperationState::Running => {}
            }
            changed
                .changed()
                .await
                .map_err(|e| ContentError::Transport(e.to_string()))?;
        }
    }

    async fn get_repository_version(
        &self,
        href: &str,
    ) -> Result<RepositoryVersion, ContentError> {
        let state = self.record(ContentCall::GetVersion(href.to_string()));
        state
            .versions
            .get(href)
            .map(|v| v.version.clone())
            .ok_or_else(|| ContentError::NotFound(href.to_string()))
    }

    async fn delete_repository_version(&self, href: &str) -> Result<String, ContentError> {
        Ok(self.start(
            ContentCall::DeleteVersion(href.to_string()),
            Effect::DeleteVersion(href.to_string()),
        ))
    }

    async fn delete_distribution(&self, href: &str) -> Result<String, ContentError> {
        Ok(self.start(
            ContentCall::DeleteDistribution(href.to_string()),
            Effect::DeleteDistribution(href.to_string()),
        ))
    }
}
