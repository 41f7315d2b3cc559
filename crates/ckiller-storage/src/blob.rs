//! Filesystem blob store: `<root>/<project id>/<name>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ckiller_models::ProjectId;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

const MAX_NAME_LENGTH: usize = 128;

/// Reject names that could escape the project directory.
pub fn validate_blob_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::invalid_key(name))
    }
}

fn validate_project_dir(id: &ProjectId) -> StorageResult<()> {
    if ProjectId::is_valid(id.as_str()) {
        Ok(())
    } else {
        Err(StorageError::invalid_key(id.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, id: &ProjectId, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path(id, name)?;
        self.ensure_parent(&path).await?;

        // Write-then-rename so readers never see a partial blob
        let tmp = path.with_extension("partial");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Saved blob {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn load(&self, id: &ProjectId, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.path(id, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(format!("{}/{}", id, name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn path(&self, id: &ProjectId, name: &str) -> StorageResult<PathBuf> {
        validate_project_dir(id)?;
        validate_blob_name(name)?;
        Ok(self.root.join(id.as_str()).join(name))
    }

    async fn import(&self, id: &ProjectId, name: &str, source: &Path) -> StorageResult<()> {
        let path = self.path(id, name)?;
        self.ensure_parent(&path).await?;

        if tokio::fs::rename(source, &path).await.is_err() {
            // Different filesystem
            tokio::fs::copy(source, &path).await?;
            tokio::fs::remove_file(source).await?;
        }
        debug!("Imported {} as {}", source.display(), path.display());
        Ok(())
    }

    async fn exists(&self, id: &ProjectId, name: &str) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(self.path(id, name)?).await?)
    }

    async fn delete_all(&self, id: &ProjectId) -> StorageResult<()> {
        validate_project_dir(id)?;
        match tokio::fs::remove_dir_all(self.root.join(id.as_str())).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
