//! S3-compatible object store over plain HTTP

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{ObjectStore, validate_key};
use crate::error::{Error, Result};

/// Objects addressed as `{endpoint}/{bucket}/{key}`
///
/// `HEAD` answers the existence check (404 means absent) and `PUT` writes.
/// An optional bearer token is sent with every request.
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    endpoint: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpObjectStore {
    /// Store talking to `endpoint`
    pub fn new(endpoint: &str) -> Result<Self> {
        url::Url::parse(endpoint)
            .map_err(|e| Error::config("storage.endpoint", format!("invalid endpoint: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bearer_token: None,
            client: reqwest::Client::new(),
        })
    }

    /// Send `Authorization: Bearer` with every request
    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let check_failed = |reason: String| Error::StorageCheckFailed {
            key: key.to_string(),
            reason,
        };
        validate_key(key).map_err(check_failed)?;

        let response = self
            .authorize(self.client.head(self.object_url(bucket, key)))
            .send()
            .await
            .map_err(|e| check_failed(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(check_failed(format!("HEAD returned {s}"))),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let write_failed = |reason: String| Error::StorageWriteFailed {
            key: key.to_string(),
            reason,
        };
        validate_key(key).map_err(write_failed)?;

        let size = body.len();
        let response = self
            .authorize(self.client.put(self.object_url(bucket, key)).body(body))
            .send()
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(write_failed(format!("PUT returned {}", response.status())));
        }
        tracing::debug!(bucket, key, bytes = size, "object uploaded");
        Ok(())
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("s3://{bucket}/{key}")
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
