//! Storage traits.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ckiller_models::{ProjectId, ProjectRecord};

use crate::error::StorageResult;

/// In-place mutation applied by [`ProjectRecordStore::update`].
pub type RecordUpdate<'a> = Box<dyn FnOnce(&mut ProjectRecord) + Send + 'a>;

/// Durable project records keyed by project id.
///
/// Every write replaces the whole record, so readers never observe a
/// partially written record.
#[async_trait]
pub trait ProjectRecordStore: Send + Sync {
    async fn get(&self, id: &ProjectId) -> StorageResult<Option<ProjectRecord>>;

    /// Insert or replace a record.
    async fn put(&self, record: &ProjectRecord) -> StorageResult<()>;

    /// Atomic read-modify-write. Fails with `NotFound` if the record is gone.
    async fn update(&self, id: &ProjectId, apply: RecordUpdate<'_>) -> StorageResult<ProjectRecord>;

    /// All records, newest first.
    async fn list_all(&self) -> StorageResult<Vec<ProjectRecord>>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: &ProjectId) -> StorageResult<bool>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Named binary artifacts grouped per project.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, id: &ProjectId, name: &str, bytes: &[u8]) -> StorageResult<()>;

    async fn load(&self, id: &ProjectId, name: &str) -> StorageResult<Vec<u8>>;

    /// Local path of a blob, whether or not it exists yet.
    fn path(&self, id: &ProjectId, name: &str) -> StorageResult<PathBuf>;

    /// Move a local file into the store.
    async fn import(&self, id: &ProjectId, name: &str, source: &Path) -> StorageResult<()>;

    async fn exists(&self, id: &ProjectId, name: &str) -> StorageResult<bool>;

    /// Remove every blob of a project.
    async fn delete_all(&self, id: &ProjectId) -> StorageResult<()>;
}
