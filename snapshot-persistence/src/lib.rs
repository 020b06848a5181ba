//! Persistence layer for snapshot workflows.
//!
//! This crate provides the storage and queue contracts the snapshot workflow
//! runs against, plus in-memory implementations.
//!
//! # Architecture
//!
//! - **Storage**: control-plane records (repository configurations,
//!   snapshots, organization domains).
//! - **TaskQueue**: task lifecycle, durable payloads used as workflow
//!   checkpoints, and cancellation notifications.
//! - **InMemoryStorage** / **InMemoryQueue**: reference implementations
//!   using HashMaps.
//!
//! # Implementing Custom Backends
//!
//! ```rust,ignore
//! use snapshot_persistence::{Storage, StorageError};
//! use async_trait::async_trait;
//!
//! pub struct PostgresStorage {
//!     // your connection pool
//! }
//!
//! #[async_trait]
//! impl Storage for PostgresStorage {
//!     async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError> {
//!         // insert the row
//!     }
//!     // ... implement other methods
//! }
//! ```

mod backend;
mod in_memory;
mod queue;

pub use backend::{Storage, StorageError};
pub use in_memory::{InMemoryQueue, InMemoryStorage};
pub use queue::{QueueError, TaskQueue};
