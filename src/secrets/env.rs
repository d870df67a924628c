//! Secrets stored as JSON in environment variables

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{SecretStore, parse_payload, unavailable};
use crate::error::{Result, SecretFailure};

/// Reads secret `name` from the variable `{prefix}{NAME}`
///
/// The name is upper-cased and every character outside `[A-Z0-9_]` becomes `_`,
/// so `sftp-us-server-details` with the default prefix is read from
/// `FEED_LANDING_SECRET_SFTP_US_SERVER_DETAILS`.
#[derive(Clone, Debug)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    /// Store reading variables with the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable name holding secret `name`
    pub fn variable_for(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Map<String, Value>> {
        let var = self.variable_for(name);
        tracing::debug!(secret = name, variable = %var, "Reading secret from environment");
        match std::env::var(&var) {
            Ok(raw) => parse_payload(name, &raw),
            Err(std::env::VarError::NotPresent) => Err(unavailable(name, SecretFailure::NotFound)),
            Err(std::env::VarError::NotUnicode(_)) => Err(unavailable(
                name,
                SecretFailure::Malformed("payload is not valid UTF-8".to_string()),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "env"
    }
}
