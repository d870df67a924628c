//! API-to-storage pipeline
//!
//! Lists loaners modified since the last sync, enriches each one with its
//! order handover date, reshapes the columns and writes one timestamped CSV
//! artifact.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

use crate::client::ApiClient;
use crate::config::Config;
use crate::context::RunContext;
use crate::enrichment::{EnrichmentEngine, HttpOrderLookup, post_process};
use crate::error::{Error, Result};
use crate::secrets::{self, CredentialProvider, SecretStore};
use crate::storage::{self, ObjectStore, keys::artifact_key};
use crate::types::{InvocationEvent, InvocationResult};

/// The infleet pipeline with its collaborators
pub struct InfleetPipeline {
    credentials: CredentialProvider,
    store: Arc<dyn ObjectStore>,
}

impl InfleetPipeline {
    /// Assemble from explicit collaborators
    pub fn new(secrets: Arc<dyn SecretStore>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            credentials: CredentialProvider::new(secrets),
            store,
        }
    }

    /// Assemble the backends selected in configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_infleet()?;
        Ok(Self::new(
            secrets::from_config(&config.secrets),
            storage::from_config(&config.storage)?,
        ))
    }

    /// Run once; every failure becomes a 500 result
    pub async fn run(&self, ctx: &RunContext, event: &InvocationEvent) -> InvocationResult {
        match self.try_run(ctx, event).await {
            Ok(result) => result,
            Err(e @ Error::StorageWriteFailed { .. }) => {
                tracing::error!(error = %e, "Error saving artifact to storage");
                InvocationResult::failure(format!("Error saving file to storage: {e}"))
            }
            Err(e) => {
                tracing::error!(error = %e, error_code = e.error_code(), "Infleet run failed");
                InvocationResult::failure(format!("Internal server error: {e}"))
            }
        }
    }

    async fn try_run(&self, ctx: &RunContext, event: &InvocationEvent) -> Result<InvocationResult> {
        let config = ctx.config();
        config.validate_infleet()?;
        let infleet = &config.infleet;
        let (Some(bucket), Some(target_dir), Some(loaner_secret), Some(order_secret)) = (
            infleet.bucket.as_deref(),
            infleet.target_dir.as_deref(),
            infleet.loaner_secret.as_deref(),
            infleet.order_secret.as_deref(),
        ) else {
            return Err(Error::config("infleet", "infleet settings are incomplete"));
        };

        let last_sync = resolve_last_sync(
            event.sync_date.as_deref(),
            ctx.run_time(),
            infleet.lookback_days,
        )?;
        tracing::info!(last_sync = %last_sync, "Resolved last sync date");

        let loaner_credential = self.credentials.api_credential(loaner_secret).await?;
        let order_credential = self.credentials.api_credential(order_secret).await?;
        let client = ApiClient::new(config.retry.clone(), infleet.request_timeout)?;

        let loaner_token = client.fetch_token(&loaner_credential).await?;
        let mut records = client
            .fetch_loaners(&loaner_credential, &loaner_token, &last_sync)
            .await?;
        if records.is_empty() {
            tracing::info!(last_sync = %last_sync, "No loaners found since last sync date");
            return Ok(InvocationResult::ok(format!(
                "Terminated : No-Loaners found Since LastSyncDate {last_sync}"
            )));
        }

        let order_token = client.fetch_token(&order_credential).await?;
        let lookup = HttpOrderLookup::new(
            client.http().clone(),
            &order_credential.endpoint.base_url,
            order_token,
            order_credential.subscription_key.clone(),
            infleet.enrichment.api_version.clone(),
            infleet.enrichment.request_timeout,
        );
        let engine = EnrichmentEngine::new(Arc::new(lookup), &infleet.enrichment);
        engine.enrich(&mut records).await;
        post_process(&mut records, &infleet.enrichment.dealer_code_prefix);

        let key = artifact_key(target_dir, &infleet.entity, ctx.run_time());
        let body = records.to_csv()?;
        let rows = records.len();
        self.store.put(bucket, &key, body).await?;

        let location = self.store.location(bucket, &key);
        tracing::info!(location = %location, rows, "Inventory items saved");
        Ok(InvocationResult::ok(format!(
            "Inventory Items successfully saved to {location}"
        )))
    }
}

/// Start of the sync window
///
/// An explicit `YYYY-MM-DD` date becomes UTC midnight in RFC 3339
/// (`2024-01-15T00:00:00+00:00`). Without one, midnight `lookback_days`
/// before `now` formatted as `%Y-%m-%dT%H:%M:%S.000Z`.
pub fn resolve_last_sync(
    sync_date: Option<&str>,
    now: DateTime<Utc>,
    lookback_days: i64,
) -> Result<String> {
    match sync_date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                tracing::error!(sync_date = raw, error = %e, "Error parsing sync date");
                Error::InvalidSyncDate {
                    value: raw.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Ok(date.and_time(chrono::NaiveTime::MIN).and_utc().to_rfc3339())
        }
        None => {
            let start = (now - Duration::days(lookback_days)).date_naive();
            Ok(start
                .and_time(chrono::NaiveTime::MIN)
                .format("%Y-%m-%dT%H:%M:%S.000Z")
                .to_string())
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 5).unwrap()
    }

    #[test]
    fn test_explicit_sync_date_is_utc_midnight() {
        assert_eq!(
            resolve_last_sync(Some("2024-01-15"), now(), 360).unwrap(),
            "2024-01-15T00:00:00+00:00"
        );
    }

    #[test]
    fn test_default_window_looks_back() {
        assert_eq!(
            resolve_last_sync(None, now(), 360).unwrap(),
            "2023-03-16T00:00:00.000Z"
        );
        assert_eq!(
            resolve_last_sync(Some(""), now(), 1).unwrap(),
            "2024-03-09T00:00:00.000Z"
        );
    }

    #[test]
    fn test_invalid_sync_date() {
        let err = resolve_last_sync(Some("15/01/2024"), now(), 360).unwrap_err();
        assert_eq!(err.error_code(), "invalid_sync_date");
    }

    #[test]
    fn test_from_config_requires_settings() {
        let err = InfleetPipeline::from_config(&Config::default()).err().unwrap();
        assert_eq!(err.error_code(), "configuration_missing");
    }
}
