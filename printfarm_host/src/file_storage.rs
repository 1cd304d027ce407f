// src/file_storage.rs - Print file storage
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error, Clone)]
pub enum FileStorageError {
    #[error("File '{0}' not found")]
    NotFound(String),
    #[error("Invalid file storage id '{0}'")]
    InvalidId(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// Source of the bytes behind a job's `file_storage_id`.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn get_file_path(&self, storage_id: &str) -> Result<PathBuf, FileStorageError>;
    async fn read_file(&self, storage_id: &str) -> Result<Vec<u8>, FileStorageError>;
}

/// Files kept under a single root directory; the storage id is the
/// path relative to that root.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only plain relative components are accepted so an id can never
    /// point outside the root.
    fn resolve(&self, storage_id: &str) -> Result<PathBuf, FileStorageError> {
        let relative = Path::new(storage_id);
        let plain = !storage_id.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(FileStorageError::InvalidId(storage_id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn get_file_path(&self, storage_id: &str) -> Result<PathBuf, FileStorageError> {
        let path = self.resolve(storage_id)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(FileStorageError::NotFound(storage_id.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileStorageError::NotFound(storage_id.to_string()))
            }
            Err(e) => Err(FileStorageError::Io(e.to_string())),
        }
    }

    async fn read_file(&self, storage_id: &str) -> Result<Vec<u8>, FileStorageError> {
        let path = self.get_file_path(storage_id).await?;
        tracing::debug!("Reading print file: {}", path.display());
        fs::read(&path).await.map_err(|e| FileStorageError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_file_under_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gcode")).unwrap();
        std::fs::write(dir.path().join("gcode/cube.gcode"), b"G28\nG1 X10\n").unwrap();
        let storage = LocalFileStorage::new(dir.path());

        let bytes = storage.read_file("gcode/cube.gcode").await.unwrap();
        assert_eq!(bytes, b"G28\nG1 X10\n");
        let path = storage.get_file_path("gcode/cube.gcode").await.unwrap();
        assert!(path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let err = storage.read_file("nope.gcode").await.unwrap_err();
        assert!(matches!(err, FileStorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn escaping_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        for id in ["../etc/passwd", "/etc/passwd", "a/../../b", ""] {
            let err = storage.get_file_path(id).await.unwrap_err();
            assert!(matches!(err, FileStorageError::InvalidId(_)), "{id}");
        }
    }
}
