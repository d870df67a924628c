//! Vendor payload fixtures and mock service setup

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// US region feed file name
pub const US_FEED: &str = "DEALERWARE-INV_20240115_120000_output.csv";

/// CA region feed file name
pub const CA_FEED: &str = "DEALERWARE-C-INV_20240116_063000_output.csv";

/// Feed with statuses ok, fail, ok
pub const MIXED_STATUS_CSV: &str = "vin,dealer,status\nYV1A,100,ok\nYV1B,200,fail\nYV1C,300,ok\n";

/// Loaner secret name
pub const LOANER_SECRET: &str = "volvo-infleet-loaner";

/// Order secret name
pub const ORDER_SECRET: &str = "volvo-infleet-order";

/// API secret pointing at `server` under `service`
pub fn api_secret(server: &MockServer, service: &str) -> Value {
    json!({
        "client_id": format!("{service}-client"),
        "client_secret": format!("{service}-secret"),
        "auth_url": format!("{}/{service}/token", server.uri()),
        "base_url": format!("{}/{service}s", server.uri()),
        "subscription_key": format!("{service}-sub"),
        "vendor_code": "VND01"
    })
}

/// SFTP secret for `username`
pub fn sftp_secret(username: &str) -> Value {
    json!({"sftp_username": username, "sftp_password": "pw", "sftp_port": 22})
}

/// One loaner record
pub fn loaner(vin: &str, global_code: &str, last_modified: &str, retailer: &str) -> Value {
    json!({
        "vin": vin,
        "retailerName": retailer,
        "retailerCode": "R1",
        "globalRetailerCode": global_code,
        "statusDate": "2024-01-01",
        "lastModifiedDate": last_modified
    })
}

/// Order response with a handover date (or none)
pub fn order(handover: Option<&str>) -> Value {
    json!({"responseDetails": {"order": {"vehicleOrderDetails": {"customer": {
        "customerHandoverDate": handover
    }}}}})
}

/// Mount a token endpoint for `service` that returns `token`
pub async fn mount_token(server: &MockServer, service: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{service}/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

/// Mount the loaner listing
pub async fn mount_loaners(server: &MockServer, loaners: Value) {
    Mock::given(method("GET"))
        .and(path("/loaners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(loaners))
        .mount(server)
        .await;
}

/// Mount one order lookup
pub async fn mount_order(server: &MockServer, vin: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/orders/{vin}")))
        .respond_with(response)
        .mount(server)
        .await;
}
