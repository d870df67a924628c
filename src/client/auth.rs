//! Client-credentials token exchange

use serde_json::Value;
use std::fmt;

use super::{ApiClient, check_status};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::secrets::ApiCredential;

/// Bearer token for one service, valid for the rest of the run
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl ApiClient {
    /// POST the client-credentials grant to the credential's `auth_url`
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` on a non-success status or transport failure
    /// after retries, or when the body has no `access_token`.
    pub async fn fetch_token(&self, credential: &ApiCredential) -> Result<AccessToken> {
        let url = credential.endpoint.auth_url.as_str();
        let form = credential.grant_form();

        let (http, form, timeout) = (&self.http, &form, self.request_timeout);

        let body: Value = with_retry(&self.retry, || async move {
            let response = http
                .post(url)
                .form(form)
                .timeout(timeout)
                .send()
                .await?;
            Ok::<_, Error>(check_status(response)?.json::<Value>().await?)
        })
        .await
        .map_err(|e| Error::AuthenticationFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::AuthenticationFailed {
                url: url.to_string(),
                reason: "response has no access_token".to_string(),
            })?;

        tracing::info!(client_id = %credential.client_id, "Retrieved access token");
        Ok(AccessToken::new(token))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::secrets::Endpoint;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(server: &MockServer) -> ApiCredential {
        ApiCredential {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            endpoint: Endpoint {
                auth_url: format!("{}/oauth/token", server.uri()),
                base_url: format!("{}/loaners", server.uri()),
            },
            subscription_key: "sub".into(),
            vendor_code: None,
            extra_fields: BTreeMap::from([("scope".to_string(), "read".to_string())]),
        }
    }

    fn client() -> ApiClient {
        let retry = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            ..Default::default()
        };
        ApiClient::new(retry, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_token_exchange_sends_grant_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_secret=csecret"))
            .and(body_string_contains("scope=read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client().fetch_token(&credential(&server)).await.unwrap();
        assert_eq!(token.secret(), "tok-1");
        assert_eq!(format!("{token:?}"), "AccessToken(<redacted>)");
    }

    #[tokio::test]
    async fn test_token_retries_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok-2"})),
            )
            .mount(&server)
            .await;

        let token = client().fetch_token(&credential(&server)).await.unwrap();
        assert_eq!(token.secret(), "tok-2");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client().fetch_token(&credential(&server)).await.unwrap_err();
        assert_eq!(err.error_code(), "authentication_failed");
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_missing_access_token_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "x"})))
            .mount(&server)
            .await;

        let err = client().fetch_token(&credential(&server)).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed { ref reason, .. } if reason.contains("access_token")));
    }
}
