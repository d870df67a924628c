//! Per-record order lookups

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::client::{AccessToken, SUBSCRIPTION_KEY_HEADER};
use crate::error::EnrichmentFailure;

/// Path of the handover date inside an order response
const HANDOVER_DATE_PATH: &[&str] = &[
    "responseDetails",
    "order",
    "vehicleOrderDetails",
    "customer",
    "customerHandoverDate",
];

/// Result of one lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The order carries a non-empty handover date
    Found(String),
    /// The order was retrieved but has no handover date
    NoDate,
    /// The lookup itself failed
    Failed(EnrichmentFailure),
}

/// One dependent lookup per record
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// Look up the handover date of `vin`; never fails outright
    async fn lookup(&self, vin: &str) -> LookupOutcome;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Order service over HTTP: `GET {base_url}/{vin}`
#[derive(Clone, Debug)]
pub struct HttpOrderLookup {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
    subscription_key: String,
    api_version: String,
    timeout: Duration,
}

impl HttpOrderLookup {
    /// Lookup against `base_url` with the run's token
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: AccessToken,
        subscription_key: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            subscription_key: subscription_key.into(),
            api_version: api_version.into(),
            timeout,
        }
    }

    async fn fetch(&self, vin: &str) -> Result<Value, EnrichmentFailure> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(vin));
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.secret())
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header("Api-Version", &self.api_version)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentFailure::Status(status.as_u16()));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| EnrichmentFailure::MalformedBody(e.to_string()))
    }
}

#[async_trait]
impl OrderLookup for HttpOrderLookup {
    async fn lookup(&self, vin: &str) -> LookupOutcome {
        match self.fetch(vin).await {
            Ok(body) => match handover_date(&body) {
                Some(date) => LookupOutcome::Found(date),
                None => LookupOutcome::NoDate,
            },
            Err(cause) => LookupOutcome::Failed(cause),
        }
    }

    fn name(&self) -> &'static str {
        "order-api"
    }
}

/// The non-empty handover date of an order response, if any
pub fn handover_date(body: &Value) -> Option<String> {
    HANDOVER_DATE_PATH
        .iter()
        .try_fold(body, |node, segment| node.get(segment))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|date| !date.is_empty())
        .map(str::to_string)
}
