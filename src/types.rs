//! Core types for feed-landing

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Event payload accepted by the pipeline entry points
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationEvent {
    /// Override of the sync window start, `YYYY-MM-DD`
    #[serde(default)]
    pub sync_date: Option<String>,
}

/// Result returned by every entry point
///
/// 200 means success or a no-op, 500 a fatal failure. Serializes as
/// `{"statusCode": .., "body": ..}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// Numeric status (200 or 500)
    pub status_code: u16,
    /// Human-readable message or nested per-region results
    pub body: Value,
}

impl InvocationResult {
    /// Successful (or no-op) result
    pub fn ok(body: impl Into<Value>) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
        }
    }

    /// Failed result
    pub fn failure(body: impl Into<Value>) -> Self {
        Self {
            status_code: 500,
            body: body.into(),
        }
    }

    /// Whether the status is 200
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// The body as text, when it is a plain message
    pub fn message(&self) -> Option<&str> {
        self.body.as_str()
    }
}

impl From<Error> for InvocationResult {
    fn from(error: Error) -> Self {
        InvocationResult::failure(error.to_string())
    }
}

/// Mask a VIN for logging: everything but the last four characters, then `****`
pub fn mask_vin(vin: &str) -> String {
    let keep = vin.chars().count().saturating_sub(4);
    let visible: String = vin.chars().take(keep).collect();
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_with_status_code_key() {
        let result = InvocationResult::ok("done");
        let json = serde_json::to_value(&result).unwrap_or_default();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"], "done");
    }

    #[test]
    fn test_error_becomes_failure() {
        let result = InvocationResult::from(Error::InvalidFileName("x.csv".into()));
        assert_eq!(result.status_code, 500);
        assert!(!result.is_success());
        assert_eq!(result.message(), Some("date not found in filename: x.csv"));
    }

    #[test]
    fn test_event_sync_date_is_optional() {
        let event: InvocationEvent = serde_json::from_str("{}").unwrap_or_default();
        assert_eq!(event.sync_date, None);
        let event: InvocationEvent =
            serde_json::from_str(r#"{"sync_date":"2024-01-15"}"#).unwrap_or_default();
        assert_eq!(event.sync_date.as_deref(), Some("2024-01-15"));
    }

    #[test]
    fn test_mask_vin() {
        assert_eq!(mask_vin("YV1DZ8256C2271234"), "YV1DZ8256C227****");
        assert_eq!(mask_vin("AB"), "****");
    }
}
