//! In-process object store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ObjectStore;
use crate::error::{Error, Result};

/// Objects held in memory; counts writes and can inject check failures
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
    puts: AtomicUsize,
    check_failure: RwLock<Option<String>>,
}

impl MemoryObjectStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Object body, if present
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, k)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of successful writes
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every existence check fail with `reason`
    pub fn fail_checks(&self, reason: &str) {
        if let Ok(mut failure) = self.check_failure.write() {
            *failure = Some(reason.to_string());
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        if let Some(reason) = self.check_failure.read().ok().and_then(|f| f.clone()) {
            return Err(Error::StorageCheckFailed {
                key: key.to_string(),
                reason,
            });
        }
        Ok(self.get(bucket, key).is_some())
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut objects = self.objects.write().map_err(|e| Error::StorageWriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        objects.insert((bucket.to_string(), key.to_string()), body);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("memory://{bucket}/{key}")
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
