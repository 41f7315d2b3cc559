//! Project record and artifact storage.
//!
//! - [`ProjectRecordStore`]: durable project records (SQLite or in-memory)
//! - [`BlobStore`]: named per-project artifacts on the local filesystem

pub mod blob;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use blob::FsBlobStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryProjectStore;
pub use sqlite::SqliteProjectStore;
pub use store::{BlobStore, ProjectRecordStore, RecordUpdate};
