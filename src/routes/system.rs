use std::sync::Arc;

use rocket::http::Status;
use rocket::response::content::RawText;
use rocket::serde::json::Json;
use rocket::{State, get};

use crate::identity::ClientNetwork;
use crate::metrics::Metrics;
use crate::pipeline::{GateError, SecurityGate};
use crate::registry::ConnectionRegistry;
use crate::stats::StatsRecorder;
use crate::store::SharedStore;

use super::{ApiError, gate_err, store_err};

/// Load-balancer health. Observed by the pipeline like any other endpoint
/// (a blocked IP gets its 429), but store failures fail open into the
/// unhealthy body instead of a bare 503 token.
#[get("/health")]
pub async fn health(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    store: &State<SharedStore>,
    registry: &State<ConnectionRegistry>,
    metrics: &State<Arc<Metrics>>,
) -> Result<(Status, Json<serde_json::Value>), ApiError> {
    match gate.observe(&net, "/health").await {
        Ok(_) | Err(GateError::Store(_)) => {}
        Err(e) => return Err(gate_err(metrics, e)),
    }

    let connected = store.ping().await.unwrap_or(false);
    let status = if connected {
        Status::Ok
    } else {
        Status::ServiceUnavailable
    };
    Ok((
        status,
        Json(serde_json::json!({
            "healthy": connected,
            "redis_connected": connected,
            "active_connections": registry.len(),
            "timestamp": chrono::Utc::now().timestamp()
        })),
    ))
}

#[get("/metrics")]
pub fn metrics_endpoint(
    metrics: &State<Arc<Metrics>>,
    registry: &State<ConnectionRegistry>,
) -> RawText<String> {
    RawText(metrics.render(registry.len()))
}

#[get("/api/cooldown")]
pub async fn cooldown(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    metrics: &State<Arc<Metrics>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    gate.observe(&net, "/api/cooldown")
        .await
        .map_err(|e| gate_err(metrics, e))?;

    let remaining = gate
        .post_wait(&net)
        .await
        .map_err(|e| gate_err(metrics, e))?;
    Ok(Json(serde_json::json!({
        "can_post": remaining == 0,
        "remaining_seconds": remaining
    })))
}

#[get("/api/stats/daily")]
pub async fn stats_daily(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    stats: &State<StatsRecorder>,
    metrics: &State<Arc<Metrics>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    gate.observe(&net, "/api/stats/daily")
        .await
        .map_err(|e| gate_err(metrics, e))?;

    let (unique_ips, message_count) = stats.daily().await.map_err(|e| store_err(metrics, e))?;
    Ok(Json(serde_json::json!({
        "unique_ips": unique_ips,
        "message_count": message_count
    })))
}

#[get("/api/stats/cities?<current_city>")]
pub async fn stats_cities(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    stats: &State<StatsRecorder>,
    metrics: &State<Arc<Metrics>>,
    current_city: Option<&str>,
) -> Result<Json<Vec<crate::models::CityStats>>, ApiError> {
    gate.observe(&net, "/api/stats/cities")
        .await
        .map_err(|e| gate_err(metrics, e))?;

    let cities = stats
        .cities(current_city)
        .await
        .map_err(|e| store_err(metrics, e))?;
    Ok(Json(cities))
}
