use std::time::Duration;

use rocket::http::Status;

use crate::common::*;

#[test]
fn honeypot_returns_throttle_and_bans_silently() {
    let app = test_app_with_limits(relaxed_limits());

    let res = post_message(
        &app.client,
        "4.4.4.4",
        "bot-fp",
        serde_json::json!({
            "browser_id": "bot",
            "message": "room available for rent",
            "message_type": "offered",
            "location": "Delhi",
            "website": "http://bot.test"
        }),
    );
    // 429, not 403: bots should read this as ordinary throttling.
    assert_eq!(res.status(), Status::TooManyRequests);

    // The ban is permanent (no TTL on the key).
    let ck = composite_key_for("4.4.4.4", "bot-fp");
    let exists = rocket::execute(app.store.exists(&format!("shadowban:{ck}")));
    assert!(exists.unwrap());
    let ttl = rocket::execute(app.store.ttl(&format!("shadowban:{ck}"))).unwrap();
    assert!(ttl.is_none(), "honeypot ban must not expire");

    // A later legitimate-looking post succeeds but is never visible.
    let res = post_message(
        &app.client,
        "4.4.4.4",
        "bot-fp",
        listing("very normal room for rent", "Delhi"),
    );
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(!body["id"].as_str().unwrap().is_empty());

    let feed: Vec<serde_json::Value> =
        get_with_identity(&app.client, "9.9.9.9", "r", "/messages?location=Delhi".to_string())
            .into_json()
            .unwrap();
    assert!(feed.is_empty(), "shadowbanned post must not reach the feed");
}

#[test]
fn three_violations_escalate_to_shadowban() {
    let app = test_app_with_limits(relaxed_limits());

    for i in 0..3 {
        let res = post_message(
            &app.client,
            "5.5.5.5",
            "scammer",
            listing("great rooms on t.me/scambot", "Delhi"),
        );
        assert_eq!(res.status(), Status::Forbidden, "scam post {i}");
    }

    let ck = composite_key_for("5.5.5.5", "scammer");
    assert!(rocket::execute(app.store.exists(&format!("shadowban:{ck}"))).unwrap());
    let ttl = rocket::execute(app.store.ttl(&format!("shadowban:{ck}")))
        .unwrap()
        .expect("auto-ban carries a TTL");
    assert!(ttl <= Duration::from_secs(24 * 3600));

    // The fourth post looks accepted but is silent.
    let res = post_message(
        &app.client,
        "5.5.5.5",
        "scammer",
        listing("totally legit room for rent", "Delhi"),
    );
    assert_eq!(res.status(), Status::Ok);
    let feed: Vec<serde_json::Value> =
        get_with_identity(&app.client, "9.9.9.9", "r", "/messages?location=Delhi".to_string())
            .into_json()
            .unwrap();
    assert!(feed.is_empty());
}

fn published_total(app: &TestApp) -> u64 {
    let text = app.client.get("/metrics").dispatch().into_string().unwrap();
    text.lines()
        .find(|l| l.starts_with("roomboard_broadcast_published_total "))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
        .unwrap()
}

#[test]
fn shadowbanned_posts_are_never_broadcast() {
    let app = test_app_with_limits(relaxed_limits());

    // Ban first via the honeypot.
    post_message(
        &app.client,
        "4.4.4.4",
        "bot-fp",
        serde_json::json!({
            "browser_id": "bot",
            "message": "room for rent",
            "message_type": "offered",
            "location": "Delhi",
            "website": "filled"
        }),
    );

    let res = post_message(
        &app.client,
        "4.4.4.4",
        "bot-fp",
        listing("room for rent today", "Delhi"),
    );
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(published_total(&app), 0, "silent post must not publish");

    // An honest post from someone else does get published.
    let res = post_message(
        &app.client,
        "8.8.8.8",
        "honest",
        listing("room available near station", "Delhi"),
    );
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(published_total(&app), 1);
}

#[test]
fn shadowbanned_posts_skip_moderation_probing() {
    let app = test_app_with_limits(relaxed_limits());

    // Ban via honeypot.
    post_message(
        &app.client,
        "4.4.4.4",
        "probe",
        serde_json::json!({
            "browser_id": "bot",
            "message": "room",
            "message_type": "offered",
            "location": "Delhi",
            "website": "x"
        }),
    );

    // Scam content that would 403 for anyone else returns 200: the banned
    // identity cannot learn which rules exist.
    let res = post_message(
        &app.client,
        "4.4.4.4",
        "probe",
        listing("rooms on t.me/scambot cheap", "Delhi"),
    );
    assert_eq!(res.status(), Status::Ok);
}
