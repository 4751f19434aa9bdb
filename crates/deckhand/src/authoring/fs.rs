//! File system collaborator used by the loader and the fetch writer.

use async_trait::async_trait;
use std::path::Path;

use super::error::{AuthoringError, Result};

/// Whole-file text access. The reconciliation core never touches the disk
/// directly; it always goes through this trait.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_all_text(&self, path: &Path) -> Result<String>;

    /// Writes `text`, creating parent directories as needed.
    async fn write_all_text(&self, path: &Path, text: &str) -> Result<()>;

    async fn delete(&self, path: &Path) -> Result<()>;
}

/// [`FileSystem`] backed by the local disk through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_all_text(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuthoringError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn write_all_text(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthoringError::WriteFile {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }

        tokio::fs::write(path, text)
            .await
            .map_err(|e| AuthoringError::WriteFile {
                path: path.to_path_buf(),
                source: e,
            })
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| AuthoringError::DeleteFile {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/board.lb");
        let fs = LocalFileSystem;

        fs.write_all_text(&path, "daily: {}\n").await.unwrap();
        assert_eq!(fs.read_all_text(&path).await.unwrap(), "daily: {}\n");

        fs.delete(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_missing_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.lb");

        let err = LocalFileSystem.read_all_text(&path).await.unwrap_err();
        assert!(matches!(err, AuthoringError::ReadFile { .. }));
        assert!(err.to_string().contains("missing.lb"));
    }

    #[tokio::test]
    async fn test_delete_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = LocalFileSystem
            .delete(&dir.path().join("gone.lb"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthoringError::DeleteFile { .. }));
    }
}
