use std::time::Duration;

use crate::models::Visibility;
use crate::store::{SharedStore, StoreResult};

/// How long unique-reporter sets are kept per IP. Longer than the 48 h
/// message retention so repeat offenders stay scored between posts.
const REPORT_SET_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const MESSAGE_REPORT_TTL: Duration = Duration::from_secs(48 * 3600);

/// Distinct reports on a single message that shadow-hide it from feeds and
/// broadcasts (the record itself survives as evidence).
pub const MESSAGE_HIDE_THRESHOLD: i64 = 3;

/// Risk derived from the number of unique reporter fingerprints on an IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskProfile {
    pub level: u8,
    pub cooldown_secs: u64,
    pub visibility: Visibility,
}

/// The progressive-friction table: more unique reporters means a longer post
/// cooldown and narrower broadcast visibility.
pub fn map_reports(unique_reports: u64) -> RiskProfile {
    match unique_reports {
        0..=1 => RiskProfile {
            level: 0,
            cooldown_secs: 60,
            visibility: Visibility::Normal,
        },
        2 => RiskProfile {
            level: 1,
            cooldown_secs: 300,
            visibility: Visibility::Normal,
        },
        3..=5 => RiskProfile {
            level: 2,
            cooldown_secs: 900,
            visibility: Visibility::Throttled,
        },
        _ => RiskProfile {
            level: 3,
            cooldown_secs: 7200,
            visibility: Visibility::Hidden,
        },
    }
}

pub struct ReputationEngine {
    store: SharedStore,
}

impl ReputationEngine {
    pub fn new(store: SharedStore) -> Self {
        ReputationEngine { store }
    }

    /// Record a report against an IP. Duplicate reporters are idempotent.
    /// Returns the unique reporter count after the report.
    pub async fn report_ip(&self, ip: &str, reporter_fp: &str) -> StoreResult<u64> {
        let key = format!("reports:ip:{ip}");
        if self.store.sadd(&key, reporter_fp).await? {
            self.store.expire(&key, REPORT_SET_TTL).await?;
        }
        self.store.scard(&key).await
    }

    /// Record a report against a single message, counting each reporter
    /// fingerprint once. Returns the distinct report count.
    pub async fn report_message(&self, message_id: &str, reporter_fp: &str) -> StoreResult<i64> {
        let by_key = format!("reports:message:{message_id}:by");
        let count_key = format!("reports:message:{message_id}");
        if self.store.sadd(&by_key, reporter_fp).await? {
            self.store.expire(&by_key, MESSAGE_REPORT_TTL).await?;
            let count = self.store.incr(&count_key, 1).await?;
            if count == 1 {
                self.store.expire(&count_key, MESSAGE_REPORT_TTL).await?;
            }
            return Ok(count);
        }
        self.message_report_count(message_id).await
    }

    pub async fn message_report_count(&self, message_id: &str) -> StoreResult<i64> {
        Ok(self
            .store
            .get(&format!("reports:message:{message_id}"))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub async fn risk_profile(&self, ip: &str) -> StoreResult<RiskProfile> {
        let unique = self.store.scard(&format!("reports:ip:{ip}")).await?;
        Ok(map_reports(unique))
    }

    /// Arm the post cooldown for an identity. Conditional set-if-newer: a
    /// shorter concurrent cooldown never overwrites a longer one.
    pub async fn start_cooldown(
        &self,
        identity: &str,
        cooldown_secs: u64,
        now_secs: i64,
    ) -> StoreResult<()> {
        let key = format!("cooldown:{identity}");
        let expires_at = now_secs + cooldown_secs as i64;
        let current: i64 = self
            .store
            .get(&key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if expires_at > current {
            self.store
                .set(
                    &key,
                    &expires_at.to_string(),
                    Some(Duration::from_secs(cooldown_secs)),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn cooldown_remaining(&self, identity: &str, now_secs: i64) -> StoreResult<u64> {
        let expires_at: i64 = self
            .store
            .get(&format!("cooldown:{identity}"))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok((expires_at - now_secs).max(0) as u64)
    }
}
