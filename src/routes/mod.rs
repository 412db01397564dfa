// Route module decomposition — each surface area in its own file.
// Shared helpers (pipeline error mapping, catchers) live here.

mod contact;
mod messages;
mod report;
mod system;
mod ws;

pub use contact::reveal_contact;
pub use messages::{get_messages, post_message};
pub use report::report_message;
pub use system::{cooldown, health, metrics_endpoint, stats_cities, stats_daily};
pub use ws::ws_feed;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use tracing::error;

use crate::metrics::Metrics;
use crate::pipeline::GateError;
use crate::store::StoreError;

pub(crate) type ApiError = (Status, Json<serde_json::Value>);

/// Map a pipeline rejection to its wire response, counting store failures on
/// the way through.
pub(crate) fn gate_err(metrics: &Arc<Metrics>, e: GateError) -> ApiError {
    if let GateError::Store(ref cause) = e {
        metrics.store_errors.fetch_add(1, Ordering::Relaxed);
        error!(error = %cause, "pipeline store failure");
    }
    e.into_response()
}

/// Store failures outside the pipeline fail closed the same way.
pub(crate) fn store_err(metrics: &Arc<Metrics>, e: StoreError) -> ApiError {
    gate_err(metrics, GateError::Store(e))
}

pub(crate) fn bad_request_body(message: &str) -> ApiError {
    (
        Status::BadRequest,
        Json(serde_json::json!({"error": "bad_request", "message": message})),
    )
}

pub(crate) fn not_found_body() -> ApiError {
    (
        Status::NotFound,
        Json(serde_json::json!({"error": "not_found", "message": "Not found"})),
    )
}

// --- Catchers ---

#[rocket::catch(400)]
pub fn bad_request() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "bad_request", "message": "Malformed request"}))
}

/// Rocket answers 422 for JSON that parses but doesn't fit the schema; the
/// wire contract promises 400 for every malformed body.
#[rocket::catch(422)]
pub fn unprocessable() -> status::Custom<Json<serde_json::Value>> {
    status::Custom(
        Status::BadRequest,
        Json(serde_json::json!({"error": "bad_request", "message": "Malformed request"})),
    )
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "not_found", "message": "Not found"}))
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "error": "rate_limited",
        "message": "Too many requests, slow down",
        "retry_after_seconds": 60
    }))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "internal", "message": "Something went wrong"}))
}
