use rocket::http::Status;

use crate::common::*;

#[test]
fn reveal_returns_the_phone() {
    let app = test_app();
    let id = seed_message(&app.client, "8.8.8.8", "seller", "Delhi");

    let res = get_with_identity(&app.client, "1.2.3.4", "buyer", format!("/api/contact/{id}"));
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["phone"], "+91 9876543210");
}

#[test]
fn reveal_without_contact_is_bad_request() {
    let app = test_app();
    let res = post_message(
        &app.client,
        "8.8.8.8",
        "seller",
        listing("room available, no calls please", "Delhi"),
    );
    assert_eq!(res.status(), Status::Ok);
    let posted: serde_json::Value = res.into_json().unwrap();
    let id = posted["id"].as_str().unwrap();
    assert_eq!(posted["has_contact"], false);

    let res = get_with_identity(&app.client, "1.2.3.4", "buyer", format!("/api/contact/{id}"));
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn reveal_unknown_id_is_not_found() {
    let app = test_app();
    let res = get_with_identity(
        &app.client,
        "1.2.3.4",
        "buyer",
        "/api/contact/definitely-missing".to_string(),
    );
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn shadowbanned_revealer_sees_nothing() {
    let app = test_app();
    let id = seed_message(&app.client, "8.8.8.8", "seller", "Delhi");

    // Ban the revealer via the honeypot.
    post_message(
        &app.client,
        "1.2.3.4",
        "buyer",
        serde_json::json!({
            "browser_id": "b",
            "message": "room",
            "message_type": "offered",
            "location": "Delhi",
            "website": "bot"
        }),
    );

    let res = get_with_identity(&app.client, "1.2.3.4", "buyer", format!("/api/contact/{id}"));
    assert_eq!(res.status(), Status::NotFound);
}
