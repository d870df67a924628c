//! Typed credentials resolved from secret payloads

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{SecretStore, unavailable};
use crate::error::{Result, SecretFailure};

const DEFAULT_SFTP_PORT: u16 = 22;

/// Fields of an API secret that are not part of the token grant
const NON_GRANT_FIELDS: &[&str] = &["auth_url", "base_url", "subscription_key", "vendor_code"];

/// SFTP login for one region
#[derive(Clone, PartialEq, Eq)]
pub struct SftpCredential {
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
    /// SSH port (default 22)
    pub port: u16,
}

impl fmt::Debug for SftpCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

/// Authorization and base URL of one REST service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Token endpoint
    pub auth_url: String,
    /// Service base URL
    pub base_url: String,
}

/// Client-credentials login for one REST service
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Token and service URLs
    pub endpoint: Endpoint,
    /// `Ocp-Apim-Subscription-Key` header value
    pub subscription_key: String,
    /// Vendor code sent to the loaner listing; `None` when the secret's value is empty
    pub vendor_code: Option<String>,
    /// Extra grant form fields (e.g. `scope`)
    pub extra_fields: BTreeMap<String, String>,
}

impl ApiCredential {
    /// Form body of the client-credentials grant
    pub fn grant_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
        ];
        form.extend(
            self.extra_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        form
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("subscription_key", &"<redacted>")
            .field("vendor_code", &self.vendor_code)
            .field("extra_fields", &self.extra_fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves secret names into typed credentials
#[derive(Clone)]
pub struct CredentialProvider {
    store: Arc<dyn SecretStore>,
}

impl CredentialProvider {
    /// Wrap a secret store
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Resolve an SFTP secret (`sftp_username`, `sftp_password`, optional `sftp_port`)
    pub async fn sftp_credential(&self, secret_name: &str) -> Result<SftpCredential> {
        let payload = self.store.get_secret(secret_name).await?;
        let username = required(secret_name, &payload, "sftp_username")?;
        let password = required(secret_name, &payload, "sftp_password")?;
        let port = parse_port(secret_name, payload.get("sftp_port"))?;
        tracing::info!(secret = secret_name, store = self.store.name(), "Retrieved SFTP credentials");
        Ok(SftpCredential {
            username,
            password,
            port,
        })
    }

    /// Resolve an API secret
    ///
    /// Requires `client_id`, `client_secret`, `auth_url`, `base_url` and
    /// `subscription_key`. `vendor_code` must be present but may be empty, in
    /// which case the loaner listing omits it. Other string fields become
    /// extra grant form fields.
    pub async fn api_credential(&self, secret_name: &str) -> Result<ApiCredential> {
        let payload = self.store.get_secret(secret_name).await?;

        let auth_url = optional(&payload, "auth_url");
        let base_url = optional(&payload, "base_url");
        let (Some(auth_url), Some(base_url)) = (auth_url, base_url) else {
            tracing::error!(secret = secret_name, "Secret is missing 'auth_url' or 'base_url'");
            return Err(unavailable(
                secret_name,
                SecretFailure::Malformed("missing 'auth_url' or 'base_url'".to_string()),
            ));
        };

        let client_id = required(secret_name, &payload, "client_id")?;
        let client_secret = required(secret_name, &payload, "client_secret")?;
        let subscription_key = required(secret_name, &payload, "subscription_key")?;
        if !payload.contains_key("vendor_code") {
            return Err(unavailable(
                secret_name,
                SecretFailure::Malformed("missing field `vendor_code`".to_string()),
            ));
        }
        let vendor_code = optional(&payload, "vendor_code");

        let extra_fields = payload
            .iter()
            .filter(|(k, _)| {
                !NON_GRANT_FIELDS.contains(&k.as_str()) && k.as_str() != "client_id" && k.as_str() != "client_secret"
            })
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();

        tracing::info!(secret = secret_name, store = self.store.name(), "Retrieved API credentials");
        Ok(ApiCredential {
            client_id,
            client_secret,
            endpoint: Endpoint { auth_url, base_url },
            subscription_key,
            vendor_code,
            extra_fields,
        })
    }
}

fn optional(payload: &Map<String, Value>, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(secret_name: &str, payload: &Map<String, Value>, field: &str) -> Result<String> {
    optional(payload, field).ok_or_else(|| {
        unavailable(
            secret_name,
            SecretFailure::Malformed(format!("missing field `{field}`")),
        )
    })
}

fn parse_port(secret_name: &str, value: Option<&Value>) -> Result<u16> {
    let malformed = |raw: &Value| {
        unavailable(
            secret_name,
            SecretFailure::Malformed(format!("invalid sftp_port {raw}")),
        )
    };
    match value {
        None | Some(Value::Null) => Ok(DEFAULT_SFTP_PORT),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(DEFAULT_SFTP_PORT),
        Some(raw @ Value::String(s)) => s.trim().parse().map_err(|_| malformed(raw)),
        Some(raw @ Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| malformed(raw)),
        Some(raw) => Err(malformed(raw)),
    }
}
