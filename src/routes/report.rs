use std::sync::Arc;
use std::sync::atomic::Ordering;

use rocket::serde::json::Json;
use rocket::{State, post};
use tracing::info;

use crate::identity::ClientNetwork;
use crate::message_store::MessageStore;
use crate::metrics::Metrics;
use crate::models::ReportRequest;
use crate::pipeline::SecurityGate;

use super::{ApiError, gate_err, not_found_body, store_err};

#[post("/api/report", format = "json", data = "<body>")]
pub async fn report_message(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    messages: &State<MessageStore>,
    metrics: &State<Arc<Metrics>>,
    body: Json<ReportRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = gate
        .admit_report(&net)
        .await
        .map_err(|e| gate_err(metrics, e))?;

    // Shadowbanned reporters are told the target doesn't exist.
    if ctx.is_shadowbanned {
        return Err(not_found_body());
    }

    let message_id = body.message_id.trim();
    let Some(reported) = messages
        .get(message_id)
        .await
        .map_err(|e| store_err(metrics, e))?
    else {
        return Err(not_found_body());
    };
    // A browser_id mismatch means a stale or forged report; same answer as
    // an unknown message so nothing is leaked.
    if reported.browser_id != body.reported_browser_id.trim() {
        return Err(not_found_body());
    }

    // The reporter is keyed by fingerprint; weak identities fall back to
    // the composite key so duplicates still collapse.
    let reporter = if ctx.fingerprint.is_empty() {
        ctx.identity.clone()
    } else {
        ctx.fingerprint.clone()
    };

    let reports_on_message = gate
        .reputation()
        .report_message(&reported.id, &reporter)
        .await
        .map_err(|e| store_err(metrics, e))?;
    let reports_on_ip = gate
        .reputation()
        .report_ip(&reported.sender_ip, &reporter)
        .await
        .map_err(|e| store_err(metrics, e))?;

    metrics.reports.fetch_add(1, Ordering::Relaxed);
    info!(
        message_id = %reported.id,
        reports_on_message,
        reports_on_ip,
        "report recorded"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Report recorded",
        "reports_on_ip": reports_on_ip
    })))
}
