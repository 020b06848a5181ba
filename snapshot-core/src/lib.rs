//! Domain types for repository snapshot workflows.
//!
//! This crate holds everything the snapshot workflow reasons about without
//! doing I/O itself: the resumable checkpoint, content count extraction,
//! task and repository models, configuration, and the content backend
//! contract together with an in-memory backend.

pub mod checkpoint;
pub mod config;
pub mod content;
pub mod counts;
pub mod model;
pub mod task;

pub use checkpoint::{SnapshotCheckpoint, StepState};
pub use config::{CertificateConfig, RemoteCertificates, SnapshotConfig};
pub use counts::{ContentCounts, ContentCountsType, ContentSummary};
pub use model::{RepositoryConfig, Snapshot};
pub use task::{REPOSITORY_SNAPSHOT_TASK, Task, TaskInfo, TaskStatus};
