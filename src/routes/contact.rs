use std::sync::Arc;
use std::sync::atomic::Ordering;

use rocket::serde::json::Json;
use rocket::{State, get};

use crate::identity::ClientNetwork;
use crate::message_store::{MessageStore, PhoneLookup};
use crate::metrics::Metrics;
use crate::pipeline::SecurityGate;

use super::{ApiError, bad_request_body, gate_err, not_found_body, store_err};

#[get("/api/contact/<id>")]
pub async fn reveal_contact(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    messages: &State<MessageStore>,
    metrics: &State<Arc<Metrics>>,
    id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = gate
        .admit_reveal(&net)
        .await
        .map_err(|e| gate_err(metrics, e))?;

    // Shadowbanned callers see the world as empty.
    if ctx.is_shadowbanned {
        return Err(not_found_body());
    }

    match messages
        .get_phone(id)
        .await
        .map_err(|e| store_err(metrics, e))?
    {
        PhoneLookup::Phone(phone) => {
            metrics.reveals.fetch_add(1, Ordering::Relaxed);
            Ok(Json(serde_json::json!({ "phone": phone })))
        }
        PhoneLookup::NoContact => Err(bad_request_body("No contact available for this message")),
        PhoneLookup::NotFound => Err(not_found_body()),
    }
}
