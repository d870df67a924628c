//! Assertions on invocation results

use feed_landing::InvocationResult;

/// Status and message of `<region>_result` in a combined recall result
pub fn region_outcome(result: &InvocationResult, region: &str) -> (u64, String) {
    let entry = &result.body[format!("{region}_result")];
    let status = entry["statusCode"]
        .as_u64()
        .unwrap_or_else(|| panic!("no statusCode for {region}: {}", result.body));
    let body = entry["body"]
        .as_str()
        .unwrap_or_else(|| panic!("no body for {region}: {}", result.body))
        .to_string();
    (status, body)
}

/// Assert a plain-message result
pub fn assert_message(result: &InvocationResult, status: u16, message: &str) {
    assert_eq!(result.status_code, status, "unexpected result: {result:?}");
    assert_eq!(result.message(), Some(message), "unexpected result: {result:?}");
}

/// Assert a failure whose message starts with `prefix`
pub fn assert_failure_starts_with(result: &InvocationResult, prefix: &str) {
    assert_eq!(result.status_code, 500, "unexpected result: {result:?}");
    let message = result.message().unwrap_or_default();
    assert!(message.starts_with(prefix), "{message:?} does not start with {prefix:?}");
}
