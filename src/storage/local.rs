//! Filesystem-backed object store

use async_trait::async_trait;
use std::path::PathBuf;

use super::{ObjectStore, validate_key};
use crate::error::{Error, Result};

/// Buckets are directories under `root`, keys are relative paths inside them
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Store rooted at `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> std::result::Result<PathBuf, String> {
        validate_key(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self
            .object_path(bucket, key)
            .map_err(|reason| Error::StorageCheckFailed {
                key: key.to_string(),
                reason,
            })?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageCheckFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let write_failed = |reason: String| Error::StorageWriteFailed {
            key: key.to_string(),
            reason,
        };
        let path = self.object_path(bucket, key).map_err(write_failed)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(e.to_string()))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| write_failed(e.to_string()))?;
        tracing::debug!(path = ?path, "object written");
        Ok(())
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.root.join(bucket).join(key).display())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
