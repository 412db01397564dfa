use std::time::Duration;

use crate::store::{SharedStore, StoreResult};

/// Distinct endpoints an identity may touch inside the window before it is
/// flagged as a bot. Raw request volume is the burst rate limiter's job;
/// this catches scripted endpoint-walking.
const DISTINCT_ENDPOINT_LIMIT: u64 = 5;
const WINDOW_MS: u64 = 500;

/// Behavioral bot detector. Each observed request appends its endpoint path
/// (as the member, so repeats collapse) to a per-identity window; reaching
/// `DISTINCT_ENDPOINT_LIMIT` distinct paths within 500 ms flags the identity.
pub struct BurstProfiler {
    store: SharedStore,
}

impl BurstProfiler {
    pub fn new(store: SharedStore) -> Self {
        BurstProfiler { store }
    }

    /// Record the endpoint hit and report whether the identity now looks
    /// like a bot. The caller applies the consequences (shadowban + IP
    /// block) and still serves the flagging request normally.
    pub async fn observe(&self, identity: &str, endpoint: &str, now_ms: u64) -> StoreResult<bool> {
        let probe = self
            .store
            .zwindow_probe(
                &format!("burst:{identity}"),
                now_ms.saturating_sub(WINDOW_MS) as f64,
                now_ms as f64,
                endpoint,
                Duration::from_secs(2),
            )
            .await?;
        Ok(probe.count >= DISTINCT_ENDPOINT_LIMIT)
    }
}
