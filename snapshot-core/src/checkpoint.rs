//! Checkpoint structures for resumable snapshot workflows.
//!
//! A checkpoint records which side-effecting backend operations a snapshot
//! workflow has already triggered. It is stored as the task payload and
//! round-tripped through the queue, so a restarted worker polls the stored
//! operation instead of triggering it again.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Progress of a single checkpointed step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StepState {
    /// The backend operation has not been triggered yet.
    #[default]
    NotStarted,
    /// The backend operation was triggered; holds its operation href.
    Triggered(String),
}

impl StepState {
    /// The stored operation href, if the step was triggered.
    pub fn href(&self) -> Option<&str> {
        match self {
            StepState::NotStarted => None,
            StepState::Triggered(href) => Some(href),
        }
    }

    pub fn is_not_started(&self) -> bool {
        matches!(self, StepState::NotStarted)
    }

    /// Record the operation href for this step.
    ///
    /// A step that is already triggered keeps its original href; the stored
    /// value is returned either way.
    pub fn trigger(&mut self, href: impl Into<String>) -> &str {
        if self.is_not_started() {
            *self = StepState::Triggered(href.into());
        }
        self.href().unwrap_or_default()
    }
}

/// Serde adapter mapping `StepState` to an optional href string.
///
/// Combined with `skip_serializing_if` this keeps the persisted document free
/// of null placeholders for steps that never ran.
mod step_state {
    use super::StepState;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(state: &StepState, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match state.href() {
            Some(href) => serializer.serialize_some(href),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<StepState, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(StepState::Triggered)
            .unwrap_or_default())
    }
}

/// Persisted progress of one snapshot workflow.
///
/// Each field is set at most once during a workflow's lifetime and never
/// cleared. Presence is the only signal that the matching trigger happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCheckpoint {
    #[serde(
        default,
        with = "step_state",
        skip_serializing_if = "StepState::is_not_started"
    )]
    pub sync_operation_ref: StepState,
    #[serde(
        default,
        with = "step_state",
        skip_serializing_if = "StepState::is_not_started"
    )]
    pub publication_operation_ref: StepState,
    #[serde(
        default,
        with = "step_state",
        skip_serializing_if = "StepState::is_not_started"
    )]
    pub distribution_operation_ref: StepState,
    /// Identifier used to build the distribution path. Stable across resumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_identifier: Option<String>,
}

impl SnapshotCheckpoint {
    /// Decode a checkpoint from a task payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload is not a valid checkpoint
    /// document.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Encode the checkpoint as a task payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if encoding fails.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Return the snapshot identifier, generating one on first use.
    pub fn snapshot_identifier_or_generate(&mut self) -> &str {
        self.snapshot_identifier
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
    }

    /// True when no side-effecting step has been triggered.
    pub fn is_fresh(&self) -> bool {
        self.sync_operation_ref.is_not_started()
            && self.publication_operation_ref.is_not_started()
            && self.distribution_operation_ref.is_not_started()
    }
}
