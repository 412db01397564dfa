use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use rocket::{Shutdown, State, get};
use rocket_ws as ws;
use tracing::debug;

use crate::identity::ClientNetwork;
use crate::metrics::Metrics;
use crate::pipeline::SecurityGate;
use crate::registry::{ConnectionGuard, ConnectionRegistry};

use super::{ApiError, bad_request_body, gate_err};

/// Push channel. The client is associated with a city by the `location`
/// query on the upgrade and receives one JSON feed frame per message; frames
/// it sends are ignored.
#[get("/ws?<location>")]
pub async fn ws_feed(
    net: ClientNetwork,
    gate: &State<SecurityGate>,
    registry: &State<ConnectionRegistry>,
    metrics: &State<Arc<Metrics>>,
    shutdown: Shutdown,
    location: Option<&str>,
    ws: ws::WebSocket,
) -> Result<ws::Channel<'static>, ApiError> {
    gate.observe(&net, "/ws")
        .await
        .map_err(|e| gate_err(metrics, e))?;

    let city = location.map(str::trim).filter(|c| !c.is_empty());
    let Some(city) = city else {
        return Err(bad_request_body("location query parameter is required"));
    };

    let (id, mut rx) = registry.register(city, &net.ip);
    let guard = ConnectionGuard {
        registry: registry.inner().clone(),
        id,
    };
    debug!(id, city, "websocket attached");

    Ok(ws.channel(move |mut stream| {
        Box::pin(async move {
            // Dropping the guard removes the registry entry however this
            // task ends, including cancellation mid-send.
            let _guard = guard;
            let mut shutdown = std::pin::pin!(shutdown);

            loop {
                tokio::select! {
                    frame = rx.recv() => {
                        match frame {
                            Some(text) => {
                                if stream.send(ws::Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            // The registry dropped us (backpressure); close.
                            None => break,
                        }
                    }
                    incoming = stream.next() => {
                        match incoming {
                            Some(Ok(ws::Message::Close(_))) | None => break,
                            // Clients send nothing meaningful; ignore.
                            Some(Ok(_)) => {}
                            Some(Err(_)) => break,
                        }
                    }
                    _ = &mut shutdown => {
                        let _ = stream.send(ws::Message::Close(None)).await;
                        break;
                    }
                }
            }

            Ok(())
        })
    }))
}
