use std::sync::Arc;
use std::sync::atomic::Ordering;

use rocket::serde::json::Json;
use rocket::{State, get, post};
use tracing::info;

use crate::events::BroadcastBus;
use crate::identity::ClientNetwork;
use crate::message_store::MessageStore;
use crate::metrics::Metrics;
use crate::models::{FeedMessage, MessageKind, PostMessage, StoredMessage, Visibility};
use crate::moderation;
use crate::pipeline::SecurityGate;
use crate::stats::StatsRecorder;

use super::{ApiError, bad_request_body, gate_err, store_err};

const MAX_BODY_CODEPOINTS: usize = 280;
const FEED_LIMIT: usize = 100;

fn validate_phone(raw: Option<&str>) -> Result<Option<String>, ()> {
    let Some(phone) = raw.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let valid_chars = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if valid_chars && (7..=15).contains(&digits) {
        Ok(Some(phone.to_string()))
    } else {
        Err(())
    }
}

#[post("/messages", format = "json", data = "<body>")]
pub async fn post_message(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    messages: &State<MessageStore>,
    bus: &State<BroadcastBus>,
    stats: &State<StatsRecorder>,
    metrics: &State<Arc<Metrics>>,
    body: Json<PostMessage>,
) -> Result<Json<FeedMessage>, ApiError> {
    let honeypot_filled = body
        .website
        .as_deref()
        .is_some_and(|w| !w.trim().is_empty());

    let ctx = gate
        .admit_post(&net, honeypot_filled)
        .await
        .map_err(|e| gate_err(metrics, e))?;

    // Field validation. 400s here apply to shadowbanned callers too, so the
    // response surface stays indistinguishable.
    let browser_id = body.browser_id.trim().to_string();
    if browser_id.is_empty() || browser_id.len() > 64 {
        return Err(bad_request_body("browser_id must be 1-64 characters"));
    }
    let Some(kind) = MessageKind::parse(body.message_type.trim()) else {
        return Err(bad_request_body(
            "message_type must be \"offered\" or \"requested\"",
        ));
    };
    let city = body.location.trim().to_string();
    if city.is_empty() || city.len() > 80 {
        return Err(bad_request_body("location is required"));
    }
    let phone = validate_phone(body.phone.as_deref())
        .map_err(|()| bad_request_body("phone number is not valid"))?;
    let preview = moderation::sanitize(&body.message);
    if preview.is_empty() {
        return Err(bad_request_body("message is required"));
    }
    if preview.chars().count() > MAX_BODY_CODEPOINTS {
        return Err(bad_request_body("message is limited to 280 characters"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().timestamp();

    if ctx.is_shadowbanned {
        // Synthetic success: no persistence, no broadcast, identical shape
        // and timing side effects.
        metrics.shadow_posts.fetch_add(1, Ordering::Relaxed);
        gate.reputation()
            .start_cooldown(&ctx.identity, ctx.cooldown_secs, created_at)
            .await
            .ok();
        return Ok(Json(FeedMessage {
            id,
            browser_id,
            message: preview,
            message_type: kind,
            timestamp: created_at,
            location: city,
            has_contact: phone.is_some(),
        }));
    }

    let accepted = gate
        .moderate_post(&ctx, &body.message)
        .await
        .map_err(|e| gate_err(metrics, e))?;

    let stored = StoredMessage {
        id,
        browser_id,
        body: accepted,
        kind,
        created_at,
        city,
        sender_ip: net.ip.clone(),
        has_contact: phone.is_some(),
    };
    messages
        .put(&stored, phone.as_deref())
        .await
        .map_err(|e| store_err(metrics, e))?;

    metrics.messages_posted.fetch_add(1, Ordering::Relaxed);
    info!(id = %stored.id, city = %stored.city, kind = kind.as_str(), "message accepted");

    // Auxiliary writes never fail the post.
    stats.record_post(&net.ip).await.ok();
    gate.reputation()
        .start_cooldown(&ctx.identity, ctx.cooldown_secs, created_at)
        .await
        .ok();

    if ctx.visibility != Visibility::Hidden {
        bus.publish(stored.to_feed(), ctx.visibility, &net.ip).await;
    }

    Ok(Json(stored.to_feed()))
}

#[get("/messages?<location>")]
pub async fn get_messages(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    messages: &State<MessageStore>,
    stats: &State<StatsRecorder>,
    metrics: &State<Arc<Metrics>>,
    location: Option<&str>,
) -> Result<Json<Vec<FeedMessage>>, ApiError> {
    gate.observe(&net, "/messages")
        .await
        .map_err(|e| gate_err(metrics, e))?;

    let city = location.map(str::trim).filter(|c| !c.is_empty());
    let Some(city) = city else {
        return Err(bad_request_body("location query parameter is required"));
    };

    let feed = messages
        .get_by_city(gate.reputation(), city, FEED_LIMIT)
        .await
        .map_err(|e| store_err(metrics, e))?;

    stats.record_city_view(city).await.ok();

    Ok(Json(feed.iter().map(StoredMessage::to_feed).collect()))
}
