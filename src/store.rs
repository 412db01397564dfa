use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};

/// Errors surfaced by the coordination store. The pipeline maps
/// `Unavailable` to 503 on mutating endpoints (fail closed).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() || e.is_connection_refusal() || e.is_connection_dropped()
        {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Protocol(e.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an atomic sliding-window probe: prune expired members, insert
/// the new one, report the resulting cardinality and the oldest surviving
/// score. Executed as one serialized unit on the key.
#[derive(Debug, Clone, Copy)]
pub struct WindowProbe {
    pub count: u64,
    pub oldest_score: Option<f64>,
}

/// The only store operations the core needs: atomic counters, TTL strings,
/// sorted-set sliding windows, sets, capped lists, pub/sub, ping.
///
/// Implementations must serialize operations on a single key.
#[async_trait]
pub trait Store: Send + Sync {
    async fn incr(&self, key: &str, delta: i64) -> StoreResult<i64>;
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;
    /// Set only if absent. Returns true when the value was written.
    async fn setnx(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;
    async fn del(&self, key: &str) -> StoreResult<()>;
    /// Remaining lifetime, or None when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()>;
    async fn zcard(&self, key: &str) -> StoreResult<u64>;
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64)
        -> StoreResult<Vec<(String, f64)>>;
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<u64>;
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()>;
    /// Atomic prune + insert + count + oldest on one window key.
    async fn zwindow_probe(
        &self,
        key: &str,
        cutoff: f64,
        score: f64,
        member: &str,
        ttl: Duration,
    ) -> StoreResult<WindowProbe>;

    /// Returns true when the member was not already present.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;
    async fn scard(&self, key: &str) -> StoreResult<u64>;
    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Push to the head of a list and trim it to `cap` entries.
    async fn lpush_trim(&self, key: &str, value: &str, cap: u64) -> StoreResult<()>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;
    /// Subscribe to a channel. The receiver yields raw payloads until the
    /// underlying subscription drops.
    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>>;

    async fn ping(&self) -> StoreResult<bool>;
}

pub type SharedStore = Arc<dyn Store>;

// --- Redis implementation ---

/// Production store: one multiplexed, auto-reconnecting connection shared by
/// every task. Pub/sub uses dedicated connections per subscription as Redis
/// requires.
pub struct RedisStore {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(StoreError::from)?;
        // Every store call runs under this deadline; a hung store surfaces
        // as Unavailable instead of pinning the request task.
        let config = redis::aio::ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(5))
            .set_response_timeout(Duration::from_secs(30));
        let conn = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(StoreError::from)?;
        Ok(RedisStore { client, conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn incr(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut c = self.conn.clone();
        let n: i64 = redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut c)
            .await?;
        Ok(n)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut c = self.conn.clone();
        let v: Option<String> = redis::cmd("GET").arg(key).query_async(&mut c).await?;
        Ok(v)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let _: () = cmd.query_async(&mut c).await?;
        Ok(())
    }

    async fn setnx(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut c = self.conn.clone();
        let v: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut c)
            .await?;
        Ok(v.is_some())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut c).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut c = self.conn.clone();
        let secs: i64 = redis::cmd("TTL").arg(key).query_async(&mut c).await?;
        if secs > 0 {
            Ok(Some(Duration::from_secs(secs as u64)))
        } else {
            Ok(None)
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async(&mut c)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut c = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut c).await?;
        Ok(n > 0)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut c)
            .await?;
        Ok(())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut c = self.conn.clone();
        let n: u64 = redis::cmd("ZCARD").arg(key).query_async(&mut c).await?;
        Ok(n)
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        let mut c = self.conn.clone();
        let pairs: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .arg("WITHSCORES")
            .query_async(&mut c)
            .await?;
        Ok(pairs)
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let mut c = self.conn.clone();
        let n: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut c)
            .await?;
        Ok(n)
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut c)
            .await?;
        Ok(())
    }

    async fn zwindow_probe(
        &self,
        key: &str,
        cutoff: f64,
        score: f64,
        member: &str,
        ttl: Duration,
    ) -> StoreResult<WindowProbe> {
        let mut c = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(cutoff)
            .ignore()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .ignore()
            .cmd("ZCARD")
            .arg(key)
            .cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .ignore();
        let (count, oldest): (u64, Vec<(String, f64)>) = pipe.query_async(&mut c).await?;
        Ok(WindowProbe {
            count,
            oldest_score: oldest.first().map(|(_, s)| *s),
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut c = self.conn.clone();
        let added: i64 = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut c)
            .await?;
        Ok(added > 0)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let mut c = self.conn.clone();
        let n: u64 = redis::cmd("SCARD").arg(key).query_async(&mut c).await?;
        Ok(n)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut c = self.conn.clone();
        let n: i64 = redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut c)
            .await?;
        Ok(n > 0)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut c = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query_async(&mut c).await?;
        Ok(members)
    }

    async fn lpush_trim(&self, key: &str, value: &str, cap: u64) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg((cap as i64) - 1)
            .ignore();
        let _: () = pipe.query_async(&mut c).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut c = self.conn.clone();
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut c)
            .await?;
        Ok(items)
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut c = self.conn.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut c)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(StoreError::from)?;
        pubsub.subscribe(channel).await.map_err(StoreError::from)?;
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn ping(&self) -> StoreResult<bool> {
        let mut c = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut c).await?;
        Ok(pong == "PONG")
    }
}

// --- In-memory implementation ---

enum Value {
    Str(String),
    ZSet(HashMap<String, f64>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Store backend used by the test suite and single-instance dev runs. Same
/// contract as Redis: TTLs are honored (purged lazily on access), pub/sub
/// loops back through process-local channels.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<&mut Entry>) -> T,
    ) -> T {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if data.get(key).is_some_and(|e| e.expired()) {
            data.remove(key);
        }
        f(data.get_mut(key))
    }

    fn insert_entry(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn incr(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if data.get(key).is_some_and(|e| e.expired()) {
            data.remove(key);
        }
        let entry = data.entry(key.to_string()).or_insert(Entry {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        let Value::Str(ref mut s) = entry.value else {
            return Err(StoreError::Protocol(format!("{key} is not a counter")));
        };
        let n = s.parse::<i64>().unwrap_or(0) + delta;
        *s = n.to_string();
        Ok(n)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            _ => Ok(None),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.insert_entry(key, Value::Str(value.to_string()), ttl);
        Ok(())
    }

    async fn setnx(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let absent = self.with_entry(key, |e| e.is_none());
        if absent {
            self.insert_entry(key, Value::Str(value.to_string()), Some(ttl));
        }
        Ok(absent)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.with_entry(key, |e| {
            Ok(e.and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(Instant::now())))
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.with_entry(key, |e| {
            if let Some(e) = e {
                e.expires_at = Some(Instant::now() + ttl);
            }
        });
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.with_entry(key, |e| e.is_some()))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if data.get(key).is_some_and(|e| e.expired()) {
            data.remove(key);
        }
        let entry = data.entry(key.to_string()).or_insert(Entry {
            value: Value::ZSet(HashMap::new()),
            expires_at: None,
        });
        if let Value::ZSet(ref mut zs) = entry.value {
            zs.insert(member.to_string(), score);
        }
        Ok(())
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::ZSet(zs),
                ..
            }) => Ok(zs.len() as u64),
            _ => Ok(0),
        })
    }

    async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StoreResult<Vec<(String, f64)>> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::ZSet(zs),
                ..
            }) => {
                let mut pairs: Vec<(String, f64)> = zs
                    .iter()
                    .filter(|(_, s)| **s >= min && **s <= max)
                    .map(|(m, s)| (m.clone(), *s))
                    .collect();
                pairs.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.0.cmp(&b.0)));
                Ok(pairs)
            }
            _ => Ok(Vec::new()),
        })
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::ZSet(zs),
                ..
            }) => {
                let before = zs.len();
                zs.retain(|_, s| *s < min || *s > max);
                Ok((before - zs.len()) as u64)
            }
            _ => Ok(0),
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        self.with_entry(key, |e| {
            if let Some(Entry {
                value: Value::ZSet(zs),
                ..
            }) = e
            {
                zs.remove(member);
            }
        });
        Ok(())
    }

    async fn zwindow_probe(
        &self,
        key: &str,
        cutoff: f64,
        score: f64,
        member: &str,
        ttl: Duration,
    ) -> StoreResult<WindowProbe> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if data.get(key).is_some_and(|e| e.expired()) {
            data.remove(key);
        }
        let entry = data.entry(key.to_string()).or_insert(Entry {
            value: Value::ZSet(HashMap::new()),
            expires_at: None,
        });
        entry.expires_at = Some(Instant::now() + ttl);
        let Value::ZSet(ref mut zs) = entry.value else {
            return Err(StoreError::Protocol(format!("{key} is not a sorted set")));
        };
        zs.retain(|_, s| *s > cutoff);
        zs.insert(member.to_string(), score);
        let count = zs.len() as u64;
        let oldest_score = zs.values().copied().fold(None, |acc: Option<f64>, s| {
            Some(acc.map_or(s, |a| a.min(s)))
        });
        Ok(WindowProbe { count, oldest_score })
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if data.get(key).is_some_and(|e| e.expired()) {
            data.remove(key);
        }
        let entry = data.entry(key.to_string()).or_insert(Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        let Value::Set(ref mut set) = entry.value else {
            return Err(StoreError::Protocol(format!("{key} is not a set")));
        };
        Ok(set.insert(member.to_string()))
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.len() as u64),
            _ => Ok(0),
        })
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.contains(member)),
            _ => Ok(false),
        })
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        })
    }

    async fn lpush_trim(&self, key: &str, value: &str, cap: u64) -> StoreResult<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if data.get(key).is_some_and(|e| e.expired()) {
            data.remove(key);
        }
        let entry = data.entry(key.to_string()).or_insert(Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        let Value::List(ref mut list) = entry.value else {
            return Err(StoreError::Protocol(format!("{key} is not a list")));
        };
        list.push_front(value.to_string());
        list.truncate(cap as usize);
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.with_entry(key, |e| match e {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                let len = list.len() as i64;
                let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
                let (start, stop) = (norm(start), norm(stop));
                if start > stop {
                    return Ok(Vec::new());
                }
                Ok(list
                    .iter()
                    .skip(start as usize)
                    .take((stop - start + 1) as usize)
                    .cloned()
                    .collect())
            }
            _ => Ok(Vec::new()),
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        // No subscribers is fine; drop the payload like Redis does.
        let _ = self.sender_for(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<mpsc::Receiver<String>> {
        let mut sub = self.sender_for(channel).subscribe();
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    async fn ping(&self) -> StoreResult<bool> {
        Ok(true)
    }
}
