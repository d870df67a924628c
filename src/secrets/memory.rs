//! In-process secret store

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{SecretStore, unavailable};
use crate::error::{Result, SecretFailure};

/// Secrets held in memory, with optional injected failures
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, std::result::Result<Value, SecretFailure>>>,
}

impl MemorySecretStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload under `name`
    pub fn insert(&self, name: &str, payload: Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(name.to_string(), Ok(payload));
        }
    }

    /// Make lookups of `name` fail with `reason`
    pub fn insert_failure(&self, name: &str, reason: SecretFailure) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(name.to_string(), Err(reason));
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<Map<String, Value>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| unavailable(name, SecretFailure::Backend(e.to_string())))?;
        match entries.get(name) {
            None => Err(unavailable(name, SecretFailure::NotFound)),
            Some(Err(reason)) => Err(unavailable(name, reason.clone())),
            Some(Ok(Value::Object(map))) => Ok(map.clone()),
            Some(Ok(_)) => Err(unavailable(
                name,
                SecretFailure::Malformed("payload is not a JSON object".to_string()),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
