use std::time::Duration;

use crate::catalog;
use crate::message_store::normalize_city;
use crate::models::CityStats;
use crate::store::{SharedStore, StoreResult};

const DAILY_TTL: Duration = Duration::from_secs(48 * 3600);
const CITY_LIST_LIMIT: usize = 20;

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Auxiliary counters behind `/api/stats/*`. Best-effort: callers ignore
/// write failures, these never gate a request.
pub struct StatsRecorder {
    store: SharedStore,
}

impl StatsRecorder {
    pub fn new(store: SharedStore) -> Self {
        StatsRecorder { store }
    }

    pub async fn record_post(&self, ip: &str) -> StoreResult<()> {
        let day = today();
        let ips_key = format!("stats:ips:{day}");
        self.store.sadd(&ips_key, ip).await?;
        self.store.expire(&ips_key, DAILY_TTL).await?;

        let count_key = format!("stats:messages:{day}");
        if self.store.incr(&count_key, 1).await? == 1 {
            self.store.expire(&count_key, DAILY_TTL).await?;
        }
        Ok(())
    }

    pub async fn record_city_view(&self, city: &str) -> StoreResult<()> {
        let city = normalize_city(city);
        if city.is_empty() {
            return Ok(());
        }
        self.store
            .incr(&format!("stats:city:views:{city}"), 1)
            .await?;
        self.store
            .sadd(&format!("stats:city:days:{city}"), &today())
            .await?;
        self.store.sadd("stats:cities", &city).await?;
        Ok(())
    }

    pub async fn daily(&self) -> StoreResult<(u64, i64)> {
        let day = today();
        let unique_ips = self.store.scard(&format!("stats:ips:{day}")).await?;
        let message_count = self
            .store
            .get(&format!("stats:messages:{day}"))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok((unique_ips, message_count))
    }

    /// Most-viewed cities with their per-day averages; the caller's current
    /// city is always included even when it has no views yet.
    pub async fn cities(&self, current_city: Option<&str>) -> StoreResult<Vec<CityStats>> {
        let mut names = self.store.smembers("stats:cities").await?;
        if let Some(current) = current_city.map(normalize_city).filter(|c| !c.is_empty())
            && !names.contains(&current)
        {
            names.push(current);
        }

        let mut out = Vec::with_capacity(names.len());
        for city in names {
            let views: i64 = self
                .store
                .get(&format!("stats:city:views:{city}"))
                .await?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let days = self
                .store
                .scard(&format!("stats:city:days:{city}"))
                .await?
                .max(1);
            out.push(CityStats {
                city,
                views,
                daily_average: views as f64 / days as f64,
            });
        }

        out.sort_by(|a, b| b.views.cmp(&a.views).then(a.city.cmp(&b.city)));
        out.truncate(CITY_LIST_LIMIT);
        // Known-catalog cities keep their canonical casing in the response.
        for entry in &mut out {
            if catalog::is_known(&entry.city) {
                entry.city = titlecase(&entry.city);
            }
        }
        Ok(out)
    }
}

fn titlecase(city: &str) -> String {
    city.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
