use std::sync::Arc;
use std::sync::atomic::Ordering;

use rocket::http::Status;
use rocket::serde::json::Json;
use tracing::warn;

use crate::config::AppConfig;
use crate::identity::{ClientNetwork, composite_key};
use crate::metrics::Metrics;
use crate::moderation::{self, RejectCategory, RemoteModerator, Verdict};
use crate::models::Visibility;
use crate::profiler::BurstProfiler;
use crate::rate_limit::{RateClass, RateLimitConfig, RateLimiter};
use crate::reputation::ReputationEngine;
use crate::shadowban::{AUTO_BAN_TTL, ShadowbanManager};
use crate::store::{SharedStore, StoreError};

/// What the pipeline hands to a handler once a request is admitted.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub identity: String,
    pub ip: String,
    pub fingerprint: String,
    pub visibility: Visibility,
    /// Reputation-derived cooldown to arm after a successful post.
    pub cooldown_secs: u64,
    pub is_shadowbanned: bool,
}

/// Pipeline rejections. Deliberately coarse: a 429 never says which of
/// burst/post/reveal/reputation fired, a 403 carries only the category
/// token, and a shadowban is never an error at all.
#[derive(Debug)]
pub enum GateError {
    RateLimited { retry_after_secs: u64 },
    ContentRejected { category: RejectCategory },
    Store(StoreError),
}

impl From<StoreError> for GateError {
    fn from(e: StoreError) -> Self {
        GateError::Store(e)
    }
}

impl GateError {
    pub fn into_response(self) -> (Status, Json<serde_json::Value>) {
        match self {
            GateError::RateLimited { retry_after_secs } => (
                Status::TooManyRequests,
                Json(serde_json::json!({
                    "error": "rate_limited",
                    "message": "Too many requests, slow down",
                    "retry_after_seconds": retry_after_secs
                })),
            ),
            GateError::ContentRejected { category } => (
                Status::Forbidden,
                Json(serde_json::json!({
                    "error": category.token(),
                    "message": "Message was not accepted"
                })),
            ),
            GateError::Store(_) => (
                Status::ServiceUnavailable,
                Json(serde_json::json!({
                    "error": "unavailable",
                    "message": "Service temporarily unavailable"
                })),
            ),
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// C11: the fixed-order security pipeline in front of every observed
/// endpoint. Order for posts: IP block, identity, burst window, burst
/// profiler, honeypot, post window + reputation cooldown, shadowban check,
/// then (from the handler) content moderation. A shadowbanned identity never
/// reaches moderation, so its rule set cannot be probed.
pub struct SecurityGate {
    secret: String,
    limiter: RateLimiter,
    profiler: BurstProfiler,
    shadowbans: ShadowbanManager,
    reputation: ReputationEngine,
    remote_moderator: Option<RemoteModerator>,
    metrics: Arc<Metrics>,
}

impl SecurityGate {
    pub fn new(
        store: SharedStore,
        config: &AppConfig,
        rate_config: RateLimitConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        SecurityGate {
            secret: config.server_secret.clone(),
            limiter: RateLimiter::new(store.clone(), rate_config),
            profiler: BurstProfiler::new(store.clone()),
            shadowbans: ShadowbanManager::new(store.clone()),
            reputation: ReputationEngine::new(store),
            remote_moderator: config
                .moderation_api_key
                .as_ref()
                .map(|key| RemoteModerator::new(key.clone(), config.moderation_api_url.clone())),
            metrics,
        }
    }

    pub fn identity_for(&self, net: &ClientNetwork) -> String {
        composite_key(&net.ip, &net.fingerprint, &self.secret)
    }

    pub fn reputation(&self) -> &ReputationEngine {
        &self.reputation
    }

    pub fn shadowbans(&self) -> &ShadowbanManager {
        &self.shadowbans
    }

    /// Steps shared by every observed endpoint: global IP block, identity
    /// derivation, burst window, burst profiler. The profiler's flagging
    /// request is still served; enforcement starts with the next request.
    async fn screen(&self, net: &ClientNetwork, endpoint: &str) -> Result<String, GateError> {
        if self.limiter.is_ip_blocked(&net.ip).await? {
            self.metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(GateError::RateLimited {
                retry_after_secs: 60,
            });
        }

        let identity = self.identity_for(net);

        let burst = self
            .limiter
            .check(RateClass::Burst, &identity, net.is_weak(), now_ms())
            .await?;
        if !burst.allowed {
            self.limiter.block_ip(&net.ip).await?;
            self.metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(GateError::RateLimited {
                retry_after_secs: self.limiter.config().ip_block_secs,
            });
        }

        if self.profiler.observe(&identity, endpoint, now_ms()).await? {
            self.metrics.bot_flags.fetch_add(1, Ordering::Relaxed);
            warn!(endpoint, "burst profiler flagged an identity");
            self.shadowbans
                .shadowban(&identity, "burst", Some(AUTO_BAN_TTL))
                .await?;
            self.limiter.block_ip(&net.ip).await?;
        }

        Ok(identity)
    }

    /// Pipeline for read endpoints.
    pub async fn observe(
        &self,
        net: &ClientNetwork,
        endpoint: &str,
    ) -> Result<SecurityContext, GateError> {
        let identity = self.screen(net, endpoint).await?;
        Ok(SecurityContext {
            identity,
            ip: net.ip.clone(),
            fingerprint: net.fingerprint.clone(),
            visibility: Visibility::Normal,
            cooldown_secs: 0,
            is_shadowbanned: false,
        })
    }

    /// Full pipeline for `POST /messages`.
    pub async fn admit_post(
        &self,
        net: &ClientNetwork,
        honeypot_filled: bool,
    ) -> Result<SecurityContext, GateError> {
        let identity = self.screen(net, "/messages").await?;

        if honeypot_filled {
            self.metrics.honeypot_hits.fetch_add(1, Ordering::Relaxed);
            self.shadowbans.shadowban(&identity, "honeypot", None).await?;
            // 429, not 403: an automated client should read this as
            // ordinary throttling.
            return Err(GateError::RateLimited {
                retry_after_secs: 60,
            });
        }

        let rate = self
            .limiter
            .check(RateClass::Post, &identity, net.is_weak(), now_ms())
            .await?;
        let cooldown_left = self
            .reputation
            .cooldown_remaining(&identity, now_secs())
            .await?;
        if !rate.allowed || cooldown_left > 0 {
            self.metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(GateError::RateLimited {
                retry_after_secs: rate.retry_after_secs.max(cooldown_left),
            });
        }

        let is_shadowbanned = self.shadowbans.is_shadowbanned(&identity).await?;
        let risk = self.reputation.risk_profile(&net.ip).await?;

        Ok(SecurityContext {
            identity,
            ip: net.ip.clone(),
            fingerprint: net.fingerprint.clone(),
            visibility: risk.visibility,
            cooldown_secs: risk.cooldown_secs,
            is_shadowbanned,
        })
    }

    /// Pipeline for `GET /api/contact/<id>`.
    pub async fn admit_reveal(&self, net: &ClientNetwork) -> Result<SecurityContext, GateError> {
        let identity = self.screen(net, "/api/contact").await?;

        let rate = self
            .limiter
            .check(RateClass::Reveal, &identity, net.is_weak(), now_ms())
            .await?;
        if !rate.allowed {
            self.metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Err(GateError::RateLimited {
                retry_after_secs: rate.retry_after_secs,
            });
        }

        let is_shadowbanned = self.shadowbans.is_shadowbanned(&identity).await?;
        Ok(SecurityContext {
            identity,
            ip: net.ip.clone(),
            fingerprint: net.fingerprint.clone(),
            visibility: Visibility::Normal,
            cooldown_secs: 0,
            is_shadowbanned,
        })
    }

    /// Pipeline for `POST /api/report`.
    pub async fn admit_report(&self, net: &ClientNetwork) -> Result<SecurityContext, GateError> {
        let identity = self.screen(net, "/api/report").await?;
        let is_shadowbanned = self.shadowbans.is_shadowbanned(&identity).await?;
        Ok(SecurityContext {
            identity,
            ip: net.ip.clone(),
            fingerprint: net.fingerprint.clone(),
            visibility: Visibility::Normal,
            cooldown_secs: 0,
            is_shadowbanned,
        })
    }

    /// Step 9 for posts: sanitize, run the local rule chain, then the remote
    /// check when configured. Rejections count as violations and may
    /// auto-shadowban. Returns the sanitized body on accept.
    pub async fn moderate_post(
        &self,
        ctx: &SecurityContext,
        text: &str,
    ) -> Result<String, GateError> {
        let clean = moderation::sanitize(text);

        if let Verdict::Reject { category, reason } = moderation::moderate(&clean) {
            self.metrics.inc_reject(category);
            warn!(category = category.token(), reason, "content rejected");
            self.shadowbans.record_violation(&ctx.identity).await?;
            return Err(GateError::ContentRejected { category });
        }

        if let Some(remote) = &self.remote_moderator
            && remote.is_flagged(&clean).await
        {
            self.metrics.inc_reject(RejectCategory::Other);
            self.shadowbans.record_violation(&ctx.identity).await?;
            return Err(GateError::ContentRejected {
                category: RejectCategory::Other,
            });
        }

        Ok(clean)
    }

    /// Residual wait before the identity may post again: the larger of the
    /// post window residue and the reputation cooldown. Read-only.
    pub async fn post_wait(&self, net: &ClientNetwork) -> Result<u64, GateError> {
        let identity = self.identity_for(net);
        let peek = self
            .limiter
            .peek(RateClass::Post, &identity, net.is_weak(), now_ms())
            .await?;
        let window_wait = if peek.allowed { 0 } else { peek.retry_after_secs };
        let cooldown_left = self
            .reputation
            .cooldown_remaining(&identity, now_secs())
            .await?;
        Ok(window_wait.max(cooldown_left))
    }
}
