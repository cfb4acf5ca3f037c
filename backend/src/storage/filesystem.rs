//! Filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::StorageBackend;
use crate::error::{AppError, Result};

/// Filesystem-based storage backend
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    /// Create new filesystem storage
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get full path for a key (using first 2 chars as subdirectory for distribution)
    pub fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.contains('\0')
        {
            return Err(AppError::Storage(format!("Invalid storage key '{}'", key)));
        }
        let prefix: String = key.chars().take(2).collect();
        Ok(self.base_path.join(prefix).join(key))
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let path = self.key_to_path(key)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.key_to_path(key)?;
        let content = fs::read(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read {}: {}", key, e)))?;
        Ok(Bytes::from(content))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_exists_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        storage
            .put("ab12__report.md", Bytes::from_static(b"# hi"))
            .await
            .unwrap();
        assert!(storage.exists("ab12__report.md").await.unwrap());
        assert!(dir.path().join("ab").join("ab12__report.md").is_file());
        assert_eq!(
            storage.get("ab12__report.md").await.unwrap(),
            Bytes::from_static(b"# hi")
        );

        storage.delete("ab12__report.md").await.unwrap();
        assert!(!storage.exists("ab12__report.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_key_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        let err = storage.get("zz__missing").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[test]
    fn test_key_with_separator_rejected() {
        let storage = FilesystemStorage::new("/tmp/atlas");
        assert!(storage.key_to_path("../etc/passwd").is_err());
        assert!(storage.key_to_path("a/b").is_err());
        assert!(storage.key_to_path("").is_err());
    }
}
