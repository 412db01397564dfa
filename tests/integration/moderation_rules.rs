use rocket::http::Status;

use crate::common::*;

fn assert_rejected_with(app: &TestApp, ip: &str, fp: &str, message: &str, token: &str) {
    let res = post_message(&app.client, ip, fp, listing(message, "Delhi"));
    assert_eq!(res.status(), Status::Forbidden, "for {message:?}");
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], token, "for {message:?}");
}

#[test]
fn embedded_phone_numbers_are_rejected() {
    let app = test_app_with_limits(relaxed_limits());
    assert_rejected_with(
        &app,
        "1.1.1.1",
        "a",
        "room available call 9876543210",
        "embedded_phone",
    );
}

#[test]
fn scam_hosts_are_rejected() {
    let app = test_app_with_limits(relaxed_limits());
    assert_rejected_with(
        &app,
        "1.1.1.2",
        "b",
        "cheap rooms listed on t.me/scambot",
        "scam_url",
    );
}

#[test]
fn off_topic_bodies_are_rejected() {
    let app = test_app_with_limits(relaxed_limits());
    assert_rejected_with(
        &app,
        "1.1.1.3",
        "c",
        "subscribe to my amazing cooking channel today",
        "off_topic",
    );
}

#[test]
fn spam_phrases_are_rejected() {
    let app = test_app_with_limits(relaxed_limits());
    assert_rejected_with(
        &app,
        "1.1.1.4",
        "d",
        "room available, dm me for details",
        "spam",
    );
}

#[test]
fn rejected_posts_never_reach_the_feed() {
    let app = test_app_with_limits(relaxed_limits());
    assert_rejected_with(
        &app,
        "1.1.1.5",
        "e",
        "room available on bit.ly/rooms",
        "scam_url",
    );
    let feed: Vec<serde_json::Value> =
        get_with_identity(&app.client, "9.9.9.9", "r", "/messages?location=Delhi".to_string())
            .into_json()
            .unwrap();
    assert!(feed.is_empty());
}

#[test]
fn rejection_reason_stays_generic() {
    let app = test_app_with_limits(relaxed_limits());
    let res = post_message(
        &app.client,
        "1.1.1.6",
        "f",
        listing("room available call 9876543210", "Delhi"),
    );
    let body: serde_json::Value = res.into_json().unwrap();
    // Token yes, rule internals no.
    assert_eq!(body["error"], "embedded_phone");
    assert!(!body.to_string().contains("regex"));
}
