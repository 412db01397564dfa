use rocket::request::{FromRequest, Outcome, Request};
use sha2::{Digest, Sha256};

use crate::config::AppConfig;

/// Network facts about the caller, extracted once per request: the real
/// client IP (behind the trusted proxy) and the client-supplied browser
/// fingerprint. The fingerprint is opaque and unverified; an empty one
/// buckets the identity by IP alone, which the rate limiter treats more
/// strictly.
pub struct ClientNetwork {
    pub ip: String,
    pub fingerprint: String,
}

impl ClientNetwork {
    /// True when no fingerprint was supplied; such identities get reduced
    /// sliding-window capacity.
    pub fn is_weak(&self) -> bool {
        self.fingerprint.is_empty()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientNetwork {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let peer = req
            .remote()
            .map(|r| r.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        // Forwarding headers are only honored from configured proxy peers;
        // with no configured proxies (dev) they are honored from anyone.
        let proxy_trusted = req
            .rocket()
            .state::<AppConfig>()
            .map(|c| c.trusted_proxies.is_empty() || c.trusted_proxies.iter().any(|p| *p == peer))
            .unwrap_or(true);

        let ip = if proxy_trusted {
            req.headers()
                .get_one("Cf-Connecting-Ip")
                .map(|s| s.trim().to_string())
                .or_else(|| {
                    req.headers()
                        .get_one("X-Forwarded-For")
                        .and_then(|s| s.split(',').next())
                        .map(|s| s.trim().to_string())
                })
                .filter(|s| !s.is_empty())
                .unwrap_or(peer)
        } else {
            peer
        };

        let fingerprint = req
            .headers()
            .get_one("X-Browser-Fingerprint")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        Outcome::Success(ClientNetwork { ip, fingerprint })
    }
}

/// Derive the per-request anonymous identity. Pure: identical inputs always
/// produce identical keys, and distinct secrets yield disjoint key spaces.
/// The key is never stored, only recomputed.
pub fn composite_key(ip: &str, fingerprint: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
