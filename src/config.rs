use std::env;

/// Server configuration. All values read from environment variables at
/// startup; a missing `SERVER_SECRET` or `REDIS_URL` is a fatal error.
///
/// Environment variables:
/// - `SERVER_SECRET` — identity-derivation secret, at least 32 bytes hex (required)
/// - `REDIS_URL` — coordination store (required)
/// - `ALLOWED_ORIGIN` — exact CORS origin; any origin when unset (dev only)
/// - `MODERATION_API_KEY` — enables the remote moderation check
/// - `MODERATION_API_URL` — remote moderation endpoint override
/// - `BIND_ADDR` — listen address (default: 0.0.0.0:3001)
/// - `TRUSTED_PROXIES` — comma-separated peer IPs allowed to set forwarding headers
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_secret: String,
    pub redis_url: String,
    pub allowed_origin: Option<String>,
    pub moderation_api_key: Option<String>,
    pub moderation_api_url: String,
    pub bind_host: String,
    pub bind_port: u16,
    /// Empty means "trust forwarding headers from any peer" (dev default).
    pub trusted_proxies: Vec<String>,
}

const DEFAULT_MODERATION_URL: &str = "https://api.openai.com/v1/moderations";

impl AppConfig {
    /// Read configuration from the environment. Panics with a clear message
    /// on missing or malformed required values so the process refuses to
    /// start misconfigured.
    pub fn from_env() -> Self {
        let server_secret = env::var("SERVER_SECRET")
            .expect("SERVER_SECRET is required (>= 32 bytes, hex-encoded)");
        validate_secret(&server_secret).expect("SERVER_SECRET invalid");

        let redis_url = env::var("REDIS_URL").expect("REDIS_URL is required");

        let (bind_host, bind_port) = parse_bind_addr(
            env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
        );

        let trusted_proxies = env::var("TRUSTED_PROXIES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        AppConfig {
            server_secret,
            redis_url,
            allowed_origin: env::var("ALLOWED_ORIGIN").ok().filter(|s| !s.is_empty()),
            moderation_api_key: env::var("MODERATION_API_KEY").ok().filter(|s| !s.is_empty()),
            moderation_api_url: env::var("MODERATION_API_URL")
                .unwrap_or_else(|_| DEFAULT_MODERATION_URL.to_string()),
            bind_host,
            bind_port,
            trusted_proxies,
        }
    }

    /// Fixed configuration for the test suite: known secret, no remote
    /// moderation, headers trusted from any peer.
    pub fn for_tests() -> Self {
        AppConfig {
            server_secret:
                "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            allowed_origin: None,
            moderation_api_key: None,
            moderation_api_url: DEFAULT_MODERATION_URL.to_string(),
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            trusted_proxies: Vec::new(),
        }
    }
}

fn validate_secret(secret: &str) -> Result<(), String> {
    if secret.len() < 64 {
        return Err(format!(
            "must be at least 32 bytes hex-encoded (64 chars), got {} chars",
            secret.len()
        ));
    }
    if !secret.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("must be hex-encoded".to_string());
    }
    Ok(())
}

fn parse_bind_addr(addr: String) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .unwrap_or_else(|_| panic!("BIND_ADDR has invalid port: {addr}"));
            (host.to_string(), port)
        }
        None => panic!("BIND_ADDR must be host:port, got {addr}"),
    }
}
