use std::env;
use std::time::Duration;

use crate::store::{SharedStore, StoreResult};

/// Configurable sliding-window limits. All read from environment variables
/// with the production defaults below.
///
/// Environment variables:
/// - `RATE_LIMIT_POST` — Max posts per identity per minute (default: 1)
/// - `RATE_LIMIT_REVEAL` — Max contact reveals per identity per hour (default: 5)
/// - `RATE_LIMIT_BURST` — Max requests per identity per 2 s (default: 20)
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub post_max: u64,
    pub post_window_secs: u64,
    pub reveal_max: u64,
    pub reveal_window_secs: u64,
    pub burst_max: u64,
    pub burst_window_secs: u64,
    /// Global IP block duration applied on burst abuse.
    pub ip_block_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            post_max: 1,
            post_window_secs: 60,
            reveal_max: 5,
            reveal_window_secs: 3600,
            burst_max: 20,
            burst_window_secs: 2,
            ip_block_secs: 1800,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("RATE_LIMIT_POST")
            && let Ok(n) = val.parse::<u64>()
        {
            config.post_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_REVEAL")
            && let Ok(n) = val.parse::<u64>()
        {
            config.reveal_max = n;
        }
        if let Ok(val) = env::var("RATE_LIMIT_BURST")
            && let Ok(n) = val.parse::<u64>()
        {
            config.burst_max = n;
        }

        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateClass {
    Post,
    Reveal,
    Burst,
}

impl RateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateClass::Post => "post",
            RateClass::Reveal => "reveal",
            RateClass::Burst => "burst",
        }
    }
}

/// Outcome of a window check. `retry_after_secs` is the time until the
/// oldest event in the window slides out (0 when allowed).
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub retry_after_secs: u64,
}

/// Sliding-window rate limiter over store sorted sets, one window per
/// `(class, identity)`. Event members are random so simultaneous events
/// never collapse; the prune/insert/count runs as one atomic store unit and
/// a post-insert count above capacity is the authoritative rejection (the
/// probe member is removed so rejected requests don't consume capacity).
pub struct RateLimiter {
    store: SharedStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: SharedStore, config: RateLimitConfig) -> Self {
        RateLimiter { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Weak identities (no fingerprint, bucketed by IP alone) get half the
    /// capacity of each class, minimum 1.
    fn limits(&self, class: RateClass, weak: bool) -> (u64, u64) {
        let (max, window) = match class {
            RateClass::Post => (self.config.post_max, self.config.post_window_secs),
            RateClass::Reveal => (self.config.reveal_max, self.config.reveal_window_secs),
            RateClass::Burst => (self.config.burst_max, self.config.burst_window_secs),
        };
        let max = if weak { (max / 2).max(1) } else { max };
        (max, window)
    }

    fn key(class: RateClass, identity: &str) -> String {
        format!("ratelimit:{}:{}", class.as_str(), identity)
    }

    /// Record an event and decide. Consumes capacity only when allowed.
    pub async fn check(
        &self,
        class: RateClass,
        identity: &str,
        weak: bool,
        now_ms: u64,
    ) -> StoreResult<RateDecision> {
        let (max, window_secs) = self.limits(class, weak);
        let window_ms = window_secs * 1000;
        let key = Self::key(class, identity);
        let member = uuid::Uuid::new_v4().to_string();

        let probe = self
            .store
            .zwindow_probe(
                &key,
                (now_ms.saturating_sub(window_ms)) as f64,
                now_ms as f64,
                &member,
                Duration::from_secs(window_secs),
            )
            .await?;

        if probe.count > max {
            self.store.zrem(&key, &member).await?;
            let oldest = probe.oldest_score.unwrap_or(now_ms as f64) as u64;
            return Ok(RateDecision {
                allowed: false,
                limit: max,
                retry_after_secs: retry_after(oldest, window_ms, now_ms),
            });
        }

        Ok(RateDecision {
            allowed: true,
            limit: max,
            retry_after_secs: 0,
        })
    }

    /// Read-only variant: prune and count without recording an event.
    pub async fn peek(
        &self,
        class: RateClass,
        identity: &str,
        weak: bool,
        now_ms: u64,
    ) -> StoreResult<RateDecision> {
        let (max, window_secs) = self.limits(class, weak);
        let window_ms = window_secs * 1000;
        let key = Self::key(class, identity);
        let cutoff = now_ms.saturating_sub(window_ms) as f64;

        self.store
            .zremrangebyscore(&key, f64::NEG_INFINITY, cutoff)
            .await?;
        let count = self.store.zcard(&key).await?;
        if count < max {
            return Ok(RateDecision {
                allowed: true,
                limit: max,
                retry_after_secs: 0,
            });
        }

        let oldest = self
            .store
            .zrange_by_score(&key, f64::NEG_INFINITY, f64::INFINITY)
            .await?
            .first()
            .map(|(_, s)| *s as u64)
            .unwrap_or(now_ms);
        Ok(RateDecision {
            allowed: false,
            limit: max,
            retry_after_secs: retry_after(oldest, window_ms, now_ms),
        })
    }

    pub async fn block_ip(&self, ip: &str) -> StoreResult<()> {
        self.store
            .set(
                &format!("blocked:ip:{ip}"),
                "1",
                Some(Duration::from_secs(self.config.ip_block_secs)),
            )
            .await
    }

    pub async fn is_ip_blocked(&self, ip: &str) -> StoreResult<bool> {
        self.store.exists(&format!("blocked:ip:{ip}")).await
    }
}

fn retry_after(oldest_ms: u64, window_ms: u64, now_ms: u64) -> u64 {
    let free_at = oldest_ms + window_ms;
    (free_at.saturating_sub(now_ms)).div_ceil(1000).max(1)
}
