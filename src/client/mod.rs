//! Authenticated REST client for the vendor services
//!
//! One [`ApiClient`] is built per run. It exchanges client credentials for a
//! bearer token (see [`ApiClient::fetch_token`]) and lists loaner records
//! (see [`ApiClient::fetch_loaners`]). Both calls go through the shared
//! transport retry policy.

mod auth;
mod loaner;

pub use auth::AccessToken;

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Header carrying the APIM subscription key
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// HTTP client with the run's retry policy and call timeout
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl ApiClient {
    /// Build a client; `request_timeout` applies to each token and listing request
    pub fn new(retry: RetryConfig, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("feed-landing/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(format!("Failed to create HTTP client: {e}"))))?;
        Ok(Self {
            http,
            retry,
            request_timeout,
        })
    }

    /// The underlying connection pool, shared with the enrichment lookups
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Turn a non-success response into `HttpStatus`
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::HttpStatus {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}
