//! Runtime for repository snapshot tasks: the resumable workflow, its
//! cancellation cleanup, the task handler, and the worker that drives it.

pub mod client;
pub mod compensation;
pub mod error;
pub mod handler;
pub mod worker;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use client::{QueueTaskClient, TaskClient};
pub use error::SnapshotError;
pub use handler::{SnapshotHandler, TaskHandler};
pub use worker::TaskWorker;
pub use workflow::{Backends, SnapshotOutcome, SnapshotRepository};

pub use snapshot_core as core;
pub use snapshot_persistence as persistence;
