use std::time::Duration;

use tracing::warn;

use crate::models::StoredMessage;
use crate::reputation::{MESSAGE_HIDE_THRESHOLD, ReputationEngine};
use crate::store::{SharedStore, StoreResult};

/// Message retention. Everything hangs off this TTL: the record, the phone,
/// and (by expiry on read) the city index entries.
pub const MESSAGE_TTL: Duration = Duration::from_secs(48 * 3600);

/// Per-city index cap. The feed never reads past this.
const CITY_INDEX_CAP: u64 = 500;

pub enum PhoneLookup {
    Phone(String),
    NoContact,
    NotFound,
}

/// Normalized city used for index keys and broadcast matching. The stored
/// record keeps the client's original spelling.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// C8: messages under `msg:<id>` with 48 h TTL, phones under `phone:<id>`
/// for lazy reveal, ids indexed newest-first per city.
pub struct MessageStore {
    store: SharedStore,
}

impl MessageStore {
    pub fn new(store: SharedStore) -> Self {
        MessageStore { store }
    }

    pub async fn put(&self, message: &StoredMessage, phone: Option<&str>) -> StoreResult<()> {
        let record = serde_json::to_string(message)
            .map_err(|e| crate::store::StoreError::Protocol(e.to_string()))?;
        self.store
            .set(&format!("msg:{}", message.id), &record, Some(MESSAGE_TTL))
            .await?;
        if let Some(phone) = phone {
            self.store
                .set(&format!("phone:{}", message.id), phone, Some(MESSAGE_TTL))
                .await?;
        }
        self.store
            .lpush_trim(
                &format!("city:{}", normalize_city(&message.city)),
                &message.id,
                CITY_INDEX_CAP,
            )
            .await
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<StoredMessage>> {
        let Some(raw) = self.store.get(&format!("msg:{id}")).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) => {
                warn!(id, error = %e, "dropping undecodable message record");
                Ok(None)
            }
        }
    }

    /// Newest-first feed for a city. Expired ids and report-hidden messages
    /// are silently dropped.
    pub async fn get_by_city(
        &self,
        reputation: &ReputationEngine,
        city: &str,
        limit: usize,
    ) -> StoreResult<Vec<StoredMessage>> {
        let ids = self
            .store
            .lrange(&format!("city:{}", normalize_city(city)), 0, -1)
            .await?;

        let mut out = Vec::new();
        for id in ids {
            if out.len() >= limit {
                break;
            }
            let Some(msg) = self.get(&id).await? else {
                continue;
            };
            if reputation.message_report_count(&id).await? >= MESSAGE_HIDE_THRESHOLD {
                continue;
            }
            out.push(msg);
        }
        Ok(out)
    }

    pub async fn get_phone(&self, id: &str) -> StoreResult<PhoneLookup> {
        if !self.store.exists(&format!("msg:{id}")).await? {
            return Ok(PhoneLookup::NotFound);
        }
        Ok(match self.store.get(&format!("phone:{id}")).await? {
            Some(phone) => PhoneLookup::Phone(phone),
            None => PhoneLookup::NoContact,
        })
    }
}
