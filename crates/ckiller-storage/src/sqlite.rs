//! SQLite project store.
//!
//! Each project is one row holding the whole record as JSON. Writes go
//! through a process-wide lock so read-modify-write updates never interleave.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ckiller_models::{ProjectId, ProjectRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::store::{ProjectRecordStore, RecordUpdate};

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct SqliteProjectStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteProjectStore {
    /// Connect using a `sqlite:` URL and apply pending migrations.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect_with(options).await
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        info!("Database migrations applied");

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl ProjectRecordStore for SqliteProjectStore {
    async fn get(&self, id: &ProjectId) -> StorageResult<Option<ProjectRecord>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM projects WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
            .transpose()
    }

    async fn put(&self, record: &ProjectRecord) -> StorageResult<()> {
        let json = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().await;

        sqlx::query(
            "INSERT INTO projects (id, record, created_at, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
        )
        .bind(record.id.as_str())
        .bind(json)
        .bind(timestamp(record.metadata.created_at))
        .bind(timestamp(record.metadata.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, id: &ProjectId, apply: RecordUpdate<'_>) -> StorageResult<ProjectRecord> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM projects WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let (json,) = row.ok_or_else(|| StorageError::not_found(format!("project {}", id)))?;

        let mut record: ProjectRecord = serde_json::from_str(&json)?;
        apply(&mut record);
        record.touch();

        sqlx::query("UPDATE projects SET record = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&record)?)
            .bind(timestamp(record.metadata.updated_at))
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(record)
    }

    async fn list_all(&self) -> StorageResult<Vec<ProjectRecord>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT record FROM projects ORDER BY created_at DESC, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
            .collect()
    }

    async fn delete(&self, id: &ProjectId) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ckiller_models::{NewProject, ProjectOptions, TimestampedText};

    use super::*;

    fn new_record(name: &str) -> ProjectRecord {
        ProjectRecord::new(
            ProjectId::new(),
            NewProject {
                name: name.to_string(),
                source_url: "https://example.com/v1".to_string(),
                options: ProjectOptions::default(),
            },
        )
    }

    async fn open_store(dir: &tempfile::TempDir) -> SqliteProjectStore {
        SqliteProjectStore::open(&dir.path().join("db/projects.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_crud() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let record = new_record("first");
        store.put(&record).await.unwrap();
        assert_eq!(store.get(&record.id).await.unwrap(), Some(record.clone()));

        let updated = store
            .update(
                &record.id,
                Box::new(|r: &mut ProjectRecord| r.commentary = vec![TimestampedText::new("0", "hello").unwrap()]),
            )
            .await
            .unwrap();
        assert_eq!(updated.commentary.len(), 1);
        assert!(updated.metadata.updated_at >= record.metadata.updated_at);

        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());
        assert_eq!(store.get(&record.id).await.unwrap(), None);

        let err = store
            .update(&record.id, Box::new(|_: &mut ProjectRecord| {}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reopen_keeps_records_and_skips_applied_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let record = new_record("persisted");
        {
            let store = open_store(&dir).await;
            store.put(&record).await.unwrap();
        }
        let store = open_store(&dir).await;
        let all = store.list_all().await.unwrap();
        assert_eq!(all, vec![record]);
        store.ping().await.unwrap();

        let applied: Vec<(i64,)> =
            sqlx::query_as("SELECT version FROM _sqlx_migrations ORDER BY version")
                .fetch_all(&store.pool)
                .await
                .unwrap();
        assert_eq!(applied, vec![(1,), (2,)]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_clobber_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir).await);
        let record = new_record("busy");
        store.put(&record).await.unwrap();

        let mut handles = Vec::new();
        for field in 0..2 {
            let store = store.clone();
            let id = record.id.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..20 {
                    let text = TimestampedText::new(&i.to_string(), format!("{field}-{i}")).unwrap();
                    store
                        .update(
                            &id,
                            Box::new(move |r: &mut ProjectRecord| {
                                if field == 0 {
                                    r.description.push(text);
                                } else {
                                    r.commentary.push(text);
                                }
                            }),
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(record.description.len(), 20);
        assert_eq!(record.commentary.len(), 20);
    }
}
