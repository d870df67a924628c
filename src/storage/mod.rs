//! Object storage for landed feeds and artifacts
//!
//! [`ObjectStore`] is the seam for every backend. The recall pipeline uses
//! [`ObjectStore::exists`] as its idempotency gate; the infleet pipeline only
//! writes.

mod http;
pub mod keys;
mod local;
mod memory;

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Bucket/key object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists at `bucket/key`
    ///
    /// "Not found" is `Ok(false)`; any other backend failure is
    /// `StorageCheckFailed`.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Write `body` to `bucket/key`, replacing any existing object
    ///
    /// # Errors
    ///
    /// Returns `StorageWriteFailed` if the backend rejects the write.
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    /// Display location of an object, e.g. `s3://bucket/key`
    fn location(&self, bucket: &str, key: &str) -> String;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Build the backend selected in configuration
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Local { root } => Ok(Arc::new(LocalObjectStore::new(root.clone()))),
        StorageConfig::Http {
            endpoint,
            bearer_token_env,
        } => {
            let token = match bearer_token_env {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    Error::config("storage.bearer_token_env", format!("{var} is not set"))
                })?),
                None => None,
            };
            Ok(Arc::new(HttpObjectStore::new(endpoint)?.with_bearer_token(token)))
        }
    }
}

/// Reject keys that could escape a bucket on path-based backends
pub(crate) fn validate_key(key: &str) -> std::result::Result<(), String> {
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(format!("key {key:?} is not a relative object key"));
    }
    Ok(())
}
