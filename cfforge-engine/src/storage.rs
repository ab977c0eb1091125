//! Object storage
//!
//! Artifacts, SBOMs and project sources live in a bucket-style object store
//! addressed by `/`-separated keys (see `cfforge_core::storage` for the key
//! conventions).

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::StorageError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Keys starting with `prefix`, sorted
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Object store backed by a directory tree: `{root}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct FilesystemObjectStore {
    bucket_dir: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Self {
        Self {
            bucket_dir: root.into().join(bucket),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.bucket_dir.join(relative))
    }

    fn io_error(key: &str, source: std::io::Error) -> StorageError {
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io {
                key: key.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(key, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Self::io_error(key, e))?;
        debug!("Stored object {}", key);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::io_error(key, e))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let bucket_dir = self.bucket_dir.clone();
        let prefix = prefix.to_string();

        let listed = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            if !bucket_dir.exists() {
                return keys;
            }
            for entry in WalkDir::new(&bucket_dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            keys
        })
        .await;

        listed.map_err(|e| StorageError::Io {
            key: "<listing>".to_string(),
            source: std::io::Error::other(e),
        })
    }
}

/// Downloads every object under `prefix` into `dest`, keeping the relative layout
///
/// Returns the number of files written.
pub async fn download_prefix(
    store: &dyn ObjectStore,
    prefix: &str,
    dest: &Path,
) -> Result<usize, StorageError> {
    let keys = store.list_objects(prefix).await?;
    let mut written = 0;

    for key in keys {
        let relative = key.strip_prefix(prefix).unwrap_or(&key);
        if relative.is_empty() || relative.ends_with('/') {
            continue;
        }
        let relative_path = Path::new(relative);
        if !relative_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key));
        }

        let content = store.get_object(&key).await?;
        let target = dest.join(relative_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    key: key.clone(),
                    source: e,
                })?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| StorageError::Io {
                key: key.clone(),
                source: e,
            })?;
        written += 1;
    }

    Ok(written)
}

/// Uploads a local file under `key`
pub async fn upload_file(
    store: &dyn ObjectStore,
    key: &str,
    path: &Path,
) -> Result<u64, StorageError> {
    let content = tokio::fs::read(path).await.map_err(|e| StorageError::Io {
        key: key.to_string(),
        source: e,
    })?;
    let size = content.len() as u64;
    store.put_object(key, content).await?;
    Ok(size)
}
