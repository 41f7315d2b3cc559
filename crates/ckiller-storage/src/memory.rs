//! In-memory project store for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use ckiller_models::{ProjectId, ProjectRecord};
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::store::{ProjectRecordStore, RecordUpdate};

#[derive(Default)]
pub struct MemoryProjectStore {
    records: RwLock<HashMap<ProjectId, ProjectRecord>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRecordStore for MemoryProjectStore {
    async fn get(&self, id: &ProjectId) -> StorageResult<Option<ProjectRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, record: &ProjectRecord) -> StorageResult<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, id: &ProjectId, apply: RecordUpdate<'_>) -> StorageResult<ProjectRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(format!("project {}", id)))?;
        apply(record);
        record.touch();
        Ok(record.clone())
    }

    async fn list_all(&self) -> StorageResult<Vec<ProjectRecord>> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(all)
    }

    async fn delete(&self, id: &ProjectId) -> StorageResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}
