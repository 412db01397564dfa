use rocket::http::Status;

use crate::common::*;

#[test]
fn health_reports_store_liveness() {
    let app = test_app();
    let res = get_with_identity(&app.client, "1.1.1.1", "a", "/health".to_string());
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["healthy"], true);
    assert_eq!(body["redis_connected"], true);
    assert_eq!(body["active_connections"], 0);
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[test]
fn metrics_exposition_is_prometheus_text() {
    let app = test_app();
    post_message(
        &app.client,
        "1.1.1.1",
        "poster",
        listing("room wanted, budget 8000", "Delhi"),
    );

    let text = app.client.get("/metrics").dispatch().into_string().unwrap();
    assert!(text.contains("# TYPE active_websocket_connections gauge"));
    assert!(text.contains("active_websocket_connections 0"));
    assert!(text.contains("roomboard_messages_posted_total 1"));
    assert!(text.contains("roomboard_broadcast_published_total 1"));
}

#[test]
fn daily_stats_count_unique_ips() {
    let app = test_app();
    post_message(&app.client, "1.1.1.1", "a", listing("room wanted here", "Delhi"));
    post_message(&app.client, "2.2.2.2", "b", listing("room wanted there", "Delhi"));
    // Second post from a seen IP, different identity.
    post_message(&app.client, "1.1.1.1", "c", listing("room wanted again", "Delhi"));

    let body: serde_json::Value =
        get_with_identity(&app.client, "3.3.3.3", "reader", "/api/stats/daily".to_string())
            .into_json()
            .unwrap();
    assert_eq!(body["unique_ips"], 2);
    assert_eq!(body["message_count"], 3);
}

#[test]
fn city_stats_rank_by_views() {
    let app = test_app();
    for _ in 0..3 {
        get_with_identity(&app.client, "1.1.1.1", "a", "/messages?location=Bangalore".to_string());
    }
    get_with_identity(&app.client, "1.1.1.1", "a", "/messages?location=Pune".to_string());

    let body: Vec<serde_json::Value> = get_with_identity(
        &app.client,
        "2.2.2.2",
        "b",
        "/api/stats/cities?current_city=Indore".to_string(),
    )
    .into_json()
    .unwrap();

    assert_eq!(body[0]["city"], "Bangalore");
    assert_eq!(body[0]["views"], 3);
    assert!(body[0]["daily_average"].as_f64().unwrap() > 0.0);
    assert!(body.iter().any(|c| c["city"] == "Indore" && c["views"] == 0));
}

#[test]
fn endpoint_walking_trips_the_profiler() {
    let app = test_app();
    let (ip, fp) = ("6.6.6.6", "walker");

    // Five distinct endpoints inside the 500 ms window. Each response is
    // still served normally, including the flagging fifth.
    let paths = [
        "/messages?location=Delhi",
        "/api/cooldown",
        "/api/stats/daily",
        "/api/stats/cities",
        "/health",
    ];
    for path in paths {
        let res = get_with_identity(&app.client, ip, fp, path.to_string());
        assert_eq!(res.status(), Status::Ok, "walk request {path}");
    }

    // The identity is now shadowbanned and the IP is blocked.
    let ck = composite_key_for(ip, fp);
    assert!(rocket::execute(app.store.exists(&format!("shadowban:{ck}"))).unwrap());
    assert!(rocket::execute(app.store.exists(&format!("blocked:ip:{ip}"))).unwrap());

    let res = post_message(&app.client, ip, fp, listing("room wanted fast", "Delhi"));
    assert_eq!(res.status(), Status::TooManyRequests);

    // Even an unrelated identity on that IP is refused while the block lasts.
    let res = get_with_identity(&app.client, ip, "someone-else", "/health".to_string());
    assert_eq!(res.status(), Status::TooManyRequests);
}
