use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::moderation::RejectCategory;

/// Process-local observability counters. Cross-instance aggregation is the
/// scraper's job; these only describe this instance.
#[derive(Default)]
pub struct Metrics {
    pub messages_posted: AtomicU64,
    /// Posts answered 2xx for shadowbanned identities without persistence.
    pub shadow_posts: AtomicU64,
    pub reveals: AtomicU64,
    pub reports: AtomicU64,
    pub rate_limited: AtomicU64,
    pub honeypot_hits: AtomicU64,
    pub bot_flags: AtomicU64,
    pub reject_embedded_phone: AtomicU64,
    pub reject_scam_url: AtomicU64,
    pub reject_profanity: AtomicU64,
    pub reject_spam: AtomicU64,
    pub reject_off_topic: AtomicU64,
    pub reject_other: AtomicU64,
    pub broadcast_published: AtomicU64,
    pub broadcast_delivered: AtomicU64,
    pub broadcast_dropped: AtomicU64,
    pub store_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_reject(&self, category: RejectCategory) {
        let counter = match category {
            RejectCategory::EmbeddedPhone => &self.reject_embedded_phone,
            RejectCategory::ScamUrl => &self.reject_scam_url,
            RejectCategory::Profanity => &self.reject_profanity,
            RejectCategory::Spam => &self.reject_spam,
            RejectCategory::OffTopic => &self.reject_off_topic,
            RejectCategory::Other => &self.reject_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus text exposition.
    pub fn render(&self, active_connections: usize) -> String {
        let mut out = String::with_capacity(2048);

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        };
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        let _ = writeln!(
            out,
            "# HELP active_websocket_connections Live WebSocket clients on this instance"
        );
        let _ = writeln!(out, "# TYPE active_websocket_connections gauge");
        let _ = writeln!(out, "active_websocket_connections {active_connections}");

        counter(
            &mut out,
            "roomboard_messages_posted_total",
            "Messages accepted and persisted",
            load(&self.messages_posted),
        );
        counter(
            &mut out,
            "roomboard_shadow_posts_total",
            "Synthetic successes served to shadowbanned identities",
            load(&self.shadow_posts),
        );
        counter(
            &mut out,
            "roomboard_reveals_total",
            "Contact reveals served",
            load(&self.reveals),
        );
        counter(
            &mut out,
            "roomboard_reports_total",
            "Message reports recorded",
            load(&self.reports),
        );
        counter(
            &mut out,
            "roomboard_rate_limited_total",
            "Requests rejected by a rate limit",
            load(&self.rate_limited),
        );
        counter(
            &mut out,
            "roomboard_honeypot_hits_total",
            "Posts that filled the honeypot field",
            load(&self.honeypot_hits),
        );
        counter(
            &mut out,
            "roomboard_bot_flags_total",
            "Identities flagged by the burst profiler",
            load(&self.bot_flags),
        );

        for (name, c) in [
            ("embedded_phone", &self.reject_embedded_phone),
            ("scam_url", &self.reject_scam_url),
            ("profanity", &self.reject_profanity),
            ("spam", &self.reject_spam),
            ("off_topic", &self.reject_off_topic),
            ("other", &self.reject_other),
        ] {
            let _ = writeln!(
                out,
                "roomboard_content_rejected_total{{category=\"{name}\"}} {}",
                load(c)
            );
        }

        counter(
            &mut out,
            "roomboard_broadcast_published_total",
            "Envelopes published to the shared channel",
            load(&self.broadcast_published),
        );
        counter(
            &mut out,
            "roomboard_broadcast_delivered_total",
            "Frames queued to local sockets",
            load(&self.broadcast_delivered),
        );
        counter(
            &mut out,
            "roomboard_broadcast_dropped_total",
            "Slow or dead sockets closed during fan-out",
            load(&self.broadcast_dropped),
        );
        counter(
            &mut out,
            "roomboard_store_errors_total",
            "Coordination store failures observed",
            load(&self.store_errors),
        );

        out
    }
}
