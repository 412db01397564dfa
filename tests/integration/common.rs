use std::sync::Arc;

use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::{Client, LocalResponse};

use roomboard::config::AppConfig;
use roomboard::rate_limit::RateLimitConfig;
use roomboard::store::{MemoryStore, SharedStore};

/// The full app wired to an in-memory store. The store handle is kept so
/// tests can inspect keys the API deliberately hides (shadowbans, blocks).
pub struct TestApp {
    pub client: Client,
    pub store: SharedStore,
}

pub fn test_app() -> TestApp {
    test_app_with_limits(RateLimitConfig::default())
}

pub fn test_app_with_limits(limits: RateLimitConfig) -> TestApp {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let rocket = roomboard::rocket_with_store(AppConfig::for_tests(), limits, store.clone());
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestApp { client, store }
}

/// Limits relaxed enough that one identity can post repeatedly inside a
/// single test without tripping the post window.
pub fn relaxed_limits() -> RateLimitConfig {
    RateLimitConfig {
        post_max: 50,
        ..RateLimitConfig::default()
    }
}

pub fn composite_key_for(ip: &str, fp: &str) -> String {
    roomboard::identity::composite_key(ip, fp, &AppConfig::for_tests().server_secret)
}

pub fn post_message<'c>(
    client: &'c Client,
    ip: &str,
    fp: &str,
    body: serde_json::Value,
) -> LocalResponse<'c> {
    client
        .post("/messages")
        .header(ContentType::JSON)
        .header(Header::new("X-Forwarded-For", ip.to_string()))
        .header(Header::new("X-Browser-Fingerprint", fp.to_string()))
        .body(body.to_string())
        .dispatch()
}

pub fn get_with_identity<'c>(
    client: &'c Client,
    ip: &str,
    fp: &str,
    path: String,
) -> LocalResponse<'c> {
    client
        .get(path)
        .header(Header::new("X-Forwarded-For", ip.to_string()))
        .header(Header::new("X-Browser-Fingerprint", fp.to_string()))
        .dispatch()
}

pub fn report<'c>(
    client: &'c Client,
    ip: &str,
    fp: &str,
    message_id: &str,
    reported_browser_id: &str,
) -> LocalResponse<'c> {
    client
        .post("/api/report")
        .header(ContentType::JSON)
        .header(Header::new("X-Forwarded-For", ip.to_string()))
        .header(Header::new("X-Browser-Fingerprint", fp.to_string()))
        .body(
            serde_json::json!({
                "message_id": message_id,
                "reported_browser_id": reported_browser_id
            })
            .to_string(),
        )
        .dispatch()
}

pub fn listing(message: &str, city: &str) -> serde_json::Value {
    serde_json::json!({
        "browser_id": "test-device",
        "message": message,
        "message_type": "requested",
        "location": city
    })
}

/// Post a valid listing and return its id, asserting success.
pub fn seed_message(client: &Client, ip: &str, fp: &str, city: &str) -> String {
    let res = post_message(
        client,
        ip,
        fp,
        serde_json::json!({
            "browser_id": "seed-device",
            "message": "2BHK flat available, rent 15000, near metro",
            "message_type": "offered",
            "phone": "+91 9876543210",
            "location": city
        }),
    );
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    body["id"].as_str().unwrap().to_string()
}
