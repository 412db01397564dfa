use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::events::BroadcastEnvelope;
use crate::message_store::normalize_city;
use crate::models::Visibility;

/// Bounded per-socket send queue. A socket that cannot drain this is closed
/// rather than buffered without bound.
const SEND_QUEUE: usize = 32;

struct ConnEntry {
    city: String,
    remote_ip: String,
    tx: mpsc::Sender<String>,
}

struct RegistryInner {
    conns: RwLock<HashMap<u64, ConnEntry>>,
    next_id: AtomicU64,
}

/// Per-instance map of live WebSocket clients and their subscribed city.
/// Mutated only on accept and close; fan-out reads under the shared lock and
/// never blocks. Never serialized, never shared across instances.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            inner: Arc::new(RegistryInner {
                conns: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Add a socket subscribed to `city`. Returns its id and the receive
    /// half its writer task drains.
    pub fn register(&self, city: &str, remote_ip: &str) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut conns = self.inner.conns.write().unwrap_or_else(|e| e.into_inner());
        conns.insert(
            id,
            ConnEntry {
                city: normalize_city(city),
                remote_ip: remote_ip.to_string(),
                tx,
            },
        );
        (id, rx)
    }

    pub fn deregister(&self, id: u64) {
        let mut conns = self.inner.conns.write().unwrap_or_else(|e| e.into_inner());
        conns.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner
            .conns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an envelope to every matching socket. Non-blocking: sockets
    /// with a full or closed queue are dropped from the registry (their
    /// writer task ends when the sender goes away). Returns the number of
    /// sockets the frame was queued to.
    pub fn fanout(&self, envelope: &BroadcastEnvelope) -> (usize, usize) {
        let Ok(frame) = serde_json::to_string(&envelope.message) else {
            return (0, 0);
        };
        let city = normalize_city(&envelope.message.location);

        let mut delivered = 0usize;
        let mut stale: Vec<u64> = Vec::new();
        {
            let conns = self.inner.conns.read().unwrap_or_else(|e| e.into_inner());
            for (id, entry) in conns.iter() {
                if entry.city != city {
                    continue;
                }
                if envelope.visibility == Visibility::Throttled
                    && entry.remote_ip != envelope.sender_ip
                {
                    continue;
                }
                match entry.tx.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_))
                    | Err(mpsc::error::TrySendError::Closed(_)) => stale.push(*id),
                }
            }
        }

        let dropped = stale.len();
        if dropped > 0 {
            debug!(dropped, "closing slow or dead sockets");
            let mut conns = self.inner.conns.write().unwrap_or_else(|e| e.into_inner());
            for id in stale {
                conns.remove(&id);
            }
        }
        (delivered, dropped)
    }
}

/// Removes the registry entry when the socket task ends, however it ends.
pub struct ConnectionGuard {
    pub registry: ConnectionRegistry,
    pub id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
