//! Loaner record listing

use serde_json::{Map, Value};

use super::{AccessToken, ApiClient, SUBSCRIPTION_KEY_HEADER, check_status};
use crate::error::{Error, Result};
use crate::records::RecordCollection;
use crate::retry::with_retry;
use crate::secrets::ApiCredential;

impl ApiClient {
    /// Loaners modified since `last_sync`, one row per VIN
    ///
    /// GETs the credential's `base_url` with `vendorCode` and `lastSyncDate`
    /// query parameters, then keeps the latest record of each VIN. An empty
    /// listing yields an empty collection.
    ///
    /// # Errors
    ///
    /// `SourceFetchFailed` when the request fails after retries or the body is
    /// not a JSON array of objects.
    pub async fn fetch_loaners(
        &self,
        credential: &ApiCredential,
        token: &AccessToken,
        last_sync: &str,
    ) -> Result<RecordCollection> {
        let url = credential.endpoint.base_url.as_str();
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(2);
        if let Some(vendor_code) = credential.vendor_code.as_deref() {
            query.push(("vendorCode", vendor_code));
        }
        query.push(("lastSyncDate", last_sync));

        let (http, query, timeout) = (&self.http, &query, self.request_timeout);
        let subscription_key = credential.subscription_key.as_str();

        let body: Value = with_retry(&self.retry, || async move {
            let response = http
                .get(url)
                .query(query)
                .bearer_auth(token.secret())
                .header(SUBSCRIPTION_KEY_HEADER, subscription_key)
                .timeout(timeout)
                .send()
                .await?;
            let text = check_status(response)?.text().await?;
            if text.trim().is_empty() {
                return Ok::<_, Error>(Value::Null);
            }
            Ok(serde_json::from_str::<Value>(&text)?)
        })
        .await
        .map_err(|e| Error::SourceFetchFailed(format!("loaner listing from {url}: {e}")))?;

        let objects = into_objects(body)?;
        let mut records = RecordCollection::from_objects(objects);
        let fetched = records.len();
        let duplicates = records.dedup_latest();
        tracing::info!(
            fetched,
            duplicates,
            unique = records.len(),
            last_sync,
            "Fetched loaner records"
        );
        Ok(records)
    }
}

/// Rows of a listing body; `null`, `{}` and an empty body mean no loaners
fn into_objects(body: Value) -> Result<Vec<Map<String, Value>>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        _ => {
            return Err(Error::SourceFetchFailed(
                "loaner listing is not a JSON array".to_string(),
            ));
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(Error::SourceFetchFailed(format!(
                "loaner listing item {idx} is not an object: {other}"
            ))),
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::secrets::Endpoint;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(server: &MockServer, vendor_code: Option<&str>) -> ApiCredential {
        ApiCredential {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            endpoint: Endpoint {
                auth_url: format!("{}/token", server.uri()),
                base_url: format!("{}/loaners", server.uri()),
            },
            subscription_key: "sub-key".into(),
            vendor_code: vendor_code.map(str::to_string),
            extra_fields: BTreeMap::new(),
        }
    }

    fn client() -> ApiClient {
        let retry = RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            ..Default::default()
        };
        ApiClient::new(retry, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_listing_sends_query_and_headers_then_dedups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loaners"))
            .and(query_param("vendorCode", "V01"))
            .and(query_param("lastSyncDate", "2024-01-15T00:00:00+00:00"))
            .and(header("authorization", "Bearer tok"))
            .and(header("ocp-apim-subscription-key", "sub-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"vin": "A", "lastModifiedDate": "2024-01-01T00:00:00Z", "n": 1},
                {"vin": "A", "lastModifiedDate": "2024-01-03T00:00:00Z", "n": 2},
                {"vin": "B", "lastModifiedDate": "2024-01-02T00:00:00Z", "n": 3}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let records = client()
            .fetch_loaners(
                &credential(&server, Some("V01")),
                &AccessToken::new("tok"),
                "2024-01-15T00:00:00+00:00",
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records.get_str(0, "vin"), Some("B"));
        assert_eq!(records.get_str(1, "vin"), Some("A"));
        assert_eq!(records.get(1, "n").unwrap().as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_empty_listing() {
        for body in ["[]", "null", "{}", ""] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;

            let records = client()
                .fetch_loaners(&credential(&server, None), &AccessToken::new("tok"), "x")
                .await
                .unwrap_or_else(|e| panic!("body {body:?}: {e}"));
            assert!(records.is_empty(), "body {body:?}");
        }
    }

    #[tokio::test]
    async fn test_failures_are_source_fetch_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loaners"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        let err = client()
            .fetch_loaners(&credential(&server, None), &AccessToken::new("tok"), "x")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "source_fetch_failed");

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;
        let err = client()
            .fetch_loaners(&credential(&server, None), &AccessToken::new("tok"), "x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
    }
}
