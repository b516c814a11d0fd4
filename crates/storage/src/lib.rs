//! Daylock Storage
//!
//! Persistence for workflows. Each workflow is one record holding its
//! embedded node and edge lists; backends differ only in where that record
//! lives.

#![warn(missing_docs)]

pub mod memory;
pub mod trait_;

#[cfg(feature = "json")]
pub mod json_storage;

#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use memory::MemoryStorage;
pub use trait_::{Result, StorageError, WorkflowStore};

#[cfg(feature = "json")]
pub use json_storage::JsonStorage;

#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
