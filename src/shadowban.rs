use std::time::Duration;

use tracing::info;

use crate::store::{SharedStore, StoreResult};

/// Content violations allowed within one counter window before the identity
/// is auto-shadowbanned.
const VIOLATION_LIMIT: i64 = 3;
const VIOLATION_TTL: Duration = Duration::from_secs(24 * 3600);
pub const AUTO_BAN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Ghost-ban bookkeeping. A shadowbanned identity keeps receiving 2xx
/// responses; the broadcast bus is simply never invoked for it, so the ban
/// is not observable from the outside.
pub struct ShadowbanManager {
    store: SharedStore,
}

impl ShadowbanManager {
    pub fn new(store: SharedStore) -> Self {
        ShadowbanManager { store }
    }

    pub async fn is_shadowbanned(&self, identity: &str) -> StoreResult<bool> {
        self.store.exists(&format!("shadowban:{identity}")).await
    }

    /// Ban the identity. `ttl: None` means permanent (honeypot).
    pub async fn shadowban(
        &self,
        identity: &str,
        reason: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        info!(identity = %&identity[..12.min(identity.len())], reason, permanent = ttl.is_none(), "shadowban");
        self.store
            .set(&format!("shadowban:{identity}"), reason, ttl)
            .await
    }

    /// Count a content violation. The counter lives 24 h from the first
    /// strike; the third strike inside that window auto-bans for 24 h.
    /// Returns the running count.
    pub async fn record_violation(&self, identity: &str) -> StoreResult<i64> {
        let key = format!("violations:{identity}");
        let count = self.store.incr(&key, 1).await?;
        if count == 1 {
            self.store.expire(&key, VIOLATION_TTL).await?;
        }
        if count >= VIOLATION_LIMIT {
            self.shadowban(identity, "violations", Some(AUTO_BAN_TTL))
                .await?;
        }
        Ok(count)
    }

    pub async fn clear(&self, identity: &str) -> StoreResult<()> {
        self.store.del(&format!("shadowban:{identity}")).await?;
        self.store.del(&format!("violations:{identity}")).await
    }
}
