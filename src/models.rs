use serde::{Deserialize, Serialize};

/// Message class: the poster either offers a room or is looking for one.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Offered,
    Requested,
}

impl MessageKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offered" => Some(MessageKind::Offered),
            "requested" => Some(MessageKind::Requested),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Offered => "offered",
            MessageKind::Requested => "requested",
        }
    }
}

/// Broadcast policy attached to an accepted message.
/// `Throttled` delivers only to sockets whose remote IP equals the sender's;
/// `Hidden` is never published at all.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Normal,
    Throttled,
    Hidden,
}

#[derive(Debug, Deserialize)]
pub struct PostMessage {
    pub browser_id: String,
    pub message: String,
    pub message_type: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub location: String,
    /// Honeypot. Invisible to humans; any non-empty value marks a bot.
    #[serde(default)]
    pub website: Option<String>,
}

/// Canonical wire shape for a message, used by the feed, the post response,
/// and WebSocket frames. The phone never appears here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedMessage {
    pub id: String,
    pub browser_id: String,
    pub message: String,
    pub message_type: MessageKind,
    /// Unix seconds.
    pub timestamp: i64,
    pub location: String,
    pub has_contact: bool,
}

/// What actually lands in the store under `msg:<id>`. Carries the sender's
/// network origin for the report pipeline; never serialized to clients as-is.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub browser_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: i64,
    pub city: String,
    pub sender_ip: String,
    pub has_contact: bool,
}

impl StoredMessage {
    pub fn to_feed(&self) -> FeedMessage {
        FeedMessage {
            id: self.id.clone(),
            browser_id: self.browser_id.clone(),
            message: self.body.clone(),
            message_type: self.kind,
            timestamp: self.created_at,
            location: self.city.clone(),
            has_contact: self.has_contact,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub message_id: String,
    pub reported_browser_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CityStats {
    pub city: String,
    pub views: i64,
    pub daily_average: f64,
}
