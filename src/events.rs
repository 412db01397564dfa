use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::models::{FeedMessage, Visibility};
use crate::registry::ConnectionRegistry;
use crate::store::SharedStore;

/// The one channel every instance publishes to and subscribes from.
pub const BROADCAST_CHANNEL: &str = "chat:messages";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BroadcastEnvelope {
    pub message: FeedMessage,
    pub origin_instance: String,
    pub visibility: Visibility,
    pub sender_ip: String,
}

/// Publishing half of the bus. Failures are logged and metered, never
/// surfaced to the HTTP response: persistence is the source of truth and the
/// bus is not a durable queue.
pub struct BroadcastBus {
    store: SharedStore,
    instance_id: String,
    metrics: Arc<Metrics>,
}

impl BroadcastBus {
    pub fn new(store: SharedStore, metrics: Arc<Metrics>) -> Self {
        BroadcastBus {
            store,
            instance_id: uuid::Uuid::new_v4().to_string(),
            metrics,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Publish an accepted message. `Hidden` envelopes are never put on the
    /// wire; the caller already keeps shadowbanned senders away from here.
    pub async fn publish(&self, message: FeedMessage, visibility: Visibility, sender_ip: &str) {
        if visibility == Visibility::Hidden {
            return;
        }
        let envelope = BroadcastEnvelope {
            message,
            origin_instance: self.instance_id.clone(),
            visibility,
            sender_ip: sender_ip.to_string(),
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to encode broadcast envelope");
                return;
            }
        };
        match self.store.publish(BROADCAST_CHANNEL, &payload).await {
            Ok(()) => {
                self.metrics
                    .broadcast_published
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "broadcast publish failed");
            }
        }
    }
}

/// Spawn this instance's single subscriber task: it bridges the shared
/// channel into the local connection registry and reconnects with backoff if
/// the subscription drops.
pub fn spawn_subscriber(store: SharedStore, registry: ConnectionRegistry, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        loop {
            match store.subscribe(BROADCAST_CHANNEL).await {
                Ok(mut rx) => {
                    info!(channel = BROADCAST_CHANNEL, "broadcast subscriber attached");
                    while let Some(payload) = rx.recv().await {
                        let envelope: BroadcastEnvelope = match serde_json::from_str(&payload) {
                            Ok(e) => e,
                            Err(e) => {
                                warn!(error = %e, "dropping undecodable broadcast payload");
                                continue;
                            }
                        };
                        let (delivered, dropped) = registry.fanout(&envelope);
                        metrics
                            .broadcast_delivered
                            .fetch_add(delivered as u64, Ordering::Relaxed);
                        metrics
                            .broadcast_dropped
                            .fetch_add(dropped as u64, Ordering::Relaxed);
                    }
                    warn!("broadcast subscription closed, reconnecting");
                }
                Err(e) => {
                    metrics.store_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "broadcast subscribe failed, retrying");
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });
}
