use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{errors::ImageError, utils::file_name::parse_file_name};

/// Path-addressed binary storage. Paths are relative to the store root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under a path derived from `name`; returns the path actually used.
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<String, ImageError>;
    /// Writes `bytes` at exactly `path`, overwriting whatever is there.
    async fn replace(&self, path: &str, bytes: &[u8]) -> Result<String, ImageError>;
    async fn read(&self, path: &str) -> Result<Vec<u8>, ImageError>;
    /// Removing a missing blob is not an error.
    async fn delete(&self, path: &str) -> Result<(), ImageError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<String, ImageError> {
        (**self).save(name, bytes).await
    }

    async fn replace(&self, path: &str, bytes: &[u8]) -> Result<String, ImageError> {
        (**self).replace(path, bytes).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ImageError> {
        (**self).read(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), ImageError> {
        (**self).delete(path).await
    }
}

/// Filesystem store laid out as `<root>/%Y/%m/%d/<name>`.
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

    fn resolve(&self, path: &str) -> Result<PathBuf, ImageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(ImageError::StorageError(format!("invalid blob path '{path}'")));
        }
        Ok(self.root.join(relative))
    }

    fn sanitize(name: &str) -> String {
        let cleaned: String = parse_file_name(name, true)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        let cleaned = cleaned.trim_start_matches('.').to_string();
        if cleaned.is_empty() { "image".to_string() } else { cleaned }
    }

    fn with_suffix(name: &str) -> String {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(7).collect();
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}_{suffix}.{ext}"),
            None => format!("{name}_{suffix}"),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<String, ImageError> {
        let dir = Utc::now().format("%Y/%m/%d").to_string();
        tokio::fs::create_dir_all(self.root.join(&dir)).await?;

        let mut file_name = Self::sanitize(name);
        loop {
            let relative = format!("{dir}/{file_name}");
            let target = self.root.join(&relative);

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(mut file) => {
                    use tokio::io::AsyncWriteExt;
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    info!(path = %relative, size = bytes.len(), "blob saved");
                    return Ok(relative);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %relative, "blob name taken, adding suffix");
                    file_name = Self::with_suffix(&Self::sanitize(name));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn replace(&self, path: &str, bytes: &[u8]) -> Result<String, ImageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| ImageError::StorageError(format!("failed to write '{path}': {e}")))?;
        info!(path, size = bytes.len(), "blob replaced");
        Ok(path.to_string())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, ImageError> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|e| ImageError::StorageError(format!("failed to read '{path}': {e}")))
    }

    async fn delete(&self, path: &str) -> Result<(), ImageError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                info!(path, "blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path, "blob already gone");
                Ok(())
            }
            Err(e) => Err(ImageError::StorageError(format!("failed to delete '{path}': {e}"))),
        }
    }
}
