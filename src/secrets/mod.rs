//! Secret retrieval and credential parsing
//!
//! A [`SecretStore`] returns the raw flat JSON payload of a named secret.
//! [`CredentialProvider`] turns payloads into typed [`SftpCredential`] and
//! [`ApiCredential`] values. Every failure is a
//! [`SecretUnavailable`](crate::error::Error::SecretUnavailable) error.

mod credentials;
mod env;
mod file;
mod memory;

pub use credentials::{ApiCredential, CredentialProvider, Endpoint, SftpCredential};
pub use env::EnvSecretStore;
pub use file::FileSecretStore;
pub use memory::MemorySecretStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::SecretsConfig;
use crate::error::{Error, Result, SecretFailure};

/// Lookup of secrets by opaque name
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the payload of `name` as a flat JSON object
    ///
    /// # Errors
    ///
    /// Returns `SecretUnavailable` with the reason the secret could not be read.
    async fn get_secret(&self, name: &str) -> Result<Map<String, Value>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Build the store selected in configuration
pub fn from_config(config: &SecretsConfig) -> Arc<dyn SecretStore> {
    match config {
        SecretsConfig::Env { prefix } => Arc::new(EnvSecretStore::new(prefix.clone())),
        SecretsConfig::File { dir } => Arc::new(FileSecretStore::new(dir.clone())),
    }
}

/// Parse a secret payload, which must be a JSON object
pub(crate) fn parse_payload(name: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(unavailable(
            name,
            SecretFailure::Malformed("payload is not a JSON object".to_string()),
        )),
        Err(e) => Err(unavailable(name, SecretFailure::Malformed(e.to_string()))),
    }
}

pub(crate) fn unavailable(name: &str, reason: SecretFailure) -> Error {
    Error::SecretUnavailable {
        name: name.to_string(),
        reason,
    }
}
