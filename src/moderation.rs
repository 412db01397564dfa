use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Stable rejection tokens surfaced to clients. The matching rule is never
/// disclosed beyond the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCategory {
    EmbeddedPhone,
    ScamUrl,
    Profanity,
    Spam,
    OffTopic,
    Other,
}

impl RejectCategory {
    pub fn token(&self) -> &'static str {
        match self {
            RejectCategory::EmbeddedPhone => "embedded_phone",
            RejectCategory::ScamUrl => "scam_url",
            RejectCategory::Profanity => "profanity",
            RejectCategory::Spam => "spam",
            RejectCategory::OffTopic => "off_topic",
            RejectCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject {
        category: RejectCategory,
        reason: &'static str,
    },
}

impl Verdict {
    fn reject(category: RejectCategory, reason: &'static str) -> Self {
        Verdict::Reject { category, reason }
    }
}

// Phone patterns: international, bare 10-digit mobile, dashed/dotted, and
// parenthesized. Short numbers like rents ("20000") must not match.
static PHONE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\+\d{1,3}[\s.-]?\d{4,6}[\s.-]?\d{4,6}",
        r"\b[6-9]\d{9}\b",
        r"\b\d{3}[\s.-]\d{3}[\s.-]\d{4}\b",
        r"\(\d{3}\)[\s.-]?\d{3}[\s.-]?\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SCAM_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:t\.me|telegram\.me|bit\.ly|tinyurl\.com|goo\.gl|rebrand\.ly|ow\.ly|lnk\.co|clickbank\.net)\b",
    )
    .unwrap()
});

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:https?://|www\.)[^\s]+").unwrap());

static PROFANITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:fuck|fucking|shit|bitch|asshole|bastard|cunt|slut|wanker|chutiya|chutiye|bhosdi|bhosdike|madarchod|behenchod|bhenchod|gandu|gaandu|harami|randi|lauda|lodu)\b",
    )
    .unwrap()
});

const SPAM_PHRASES: &[&str] = &[
    "contact me on telegram",
    "message me on telegram",
    "dm me",
    "whatsapp only",
    "make money fast",
    "limited offer",
    "act fast",
    "earn from home",
    "work from home",
    "guaranteed returns",
    "investment opportunity",
    "click the link",
];

const RENTAL_KEYWORDS: &[&str] = &[
    "room",
    "flat",
    "apartment",
    "bhk",
    "rent",
    "rental",
    "property",
    "location",
    "available",
    "looking",
    "accommodation",
    "deposit",
    "furnished",
    "sharing",
    "parking",
    "tenant",
    "landlord",
    "pg",
];

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Strip HTML tags; what remains is plain text. Idempotent.
pub fn sanitize(text: &str) -> String {
    TAG_RE.replace_all(text, "").trim().to_string()
}

/// Apply the local rule chain in order. Pure; deterministic; idempotent on
/// sanitized input.
pub fn moderate(text: &str) -> Verdict {
    if PHONE_RES.iter().any(|re| re.is_match(text)) {
        return Verdict::reject(RejectCategory::EmbeddedPhone, "use the phone field");
    }

    if SCAM_HOST_RE.is_match(text) {
        return Verdict::reject(RejectCategory::ScamUrl, "link not allowed");
    }

    if URL_RE.find_iter(text).count() >= 3 {
        return Verdict::reject(RejectCategory::Spam, "too many links");
    }

    if PROFANITY_RE.is_match(text) {
        return Verdict::reject(RejectCategory::Profanity, "keep it civil");
    }

    let lower = text.to_lowercase();
    if SPAM_PHRASES.iter().any(|p| lower.contains(p)) {
        return Verdict::reject(RejectCategory::Spam, "spam phrase");
    }

    if shouty(text) || has_char_run(text, 5) {
        return Verdict::reject(RejectCategory::Other, "formatting");
    }

    if off_topic(&lower) {
        return Verdict::reject(RejectCategory::OffTopic, "not about rooms or rentals");
    }

    Verdict::Accept
}

/// More than 70% uppercase among the letters, for texts with at least 10
/// letters.
fn shouty(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 10 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper * 10 > letters.len() * 7
}

/// Any run of the same character longer than `limit`.
fn has_char_run(text: &str, limit: usize) -> bool {
    let mut prev = None;
    let mut run = 0usize;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
            if run > limit {
                return true;
            }
        } else {
            prev = Some(c);
            run = 1;
        }
    }
    false
}

/// Bodies longer than three words must keep at least 10% of their tokens in
/// the rental vocabulary.
fn off_topic(lower: &str) -> bool {
    let tokens: Vec<&str> = lower
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() <= 3 {
        return false;
    }
    let hits = tokens
        .iter()
        .filter(|t| RENTAL_KEYWORDS.iter().any(|k| t.contains(k)))
        .count();
    hits * 10 < tokens.len()
}

/// Optional remote moderation check. Fail-open: any transport or parse
/// failure passes the text through, availability beats precision on the
/// rare outage.
pub struct RemoteModerator {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

const FLAGGED_PREFIXES: &[&str] = &["hate", "harassment", "sexual", "violence"];

impl RemoteModerator {
    pub fn new(api_key: String, url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(3))
            .build()
            .expect("failed to create moderation HTTP client");
        RemoteModerator {
            client,
            api_key,
            url,
        }
    }

    /// True when the remote service flags the text for one of the blocked
    /// categories; false on clean text or on any failure.
    pub async fn is_flagged(&self, text: &str) -> bool {
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await;

        let body: serde_json::Value = match res {
            Ok(r) => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "moderation response unreadable, passing");
                    return false;
                }
            },
            Err(e) => {
                warn!(error = %e, "moderation call failed, passing");
                return false;
            }
        };

        let Some(result) = body["results"].get(0) else {
            return false;
        };
        if result["flagged"].as_bool() != Some(true) {
            return false;
        }
        result["categories"]
            .as_object()
            .map(|cats| {
                cats.iter().any(|(name, hit)| {
                    hit.as_bool() == Some(true)
                        && FLAGGED_PREFIXES.iter().any(|p| name.starts_with(p))
                })
            })
            .unwrap_or(false)
    }
}
