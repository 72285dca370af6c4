//! WebSocket connection driven by the replica.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use protocol::{Broadcast, Replica, Request};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::behavior::Behavior;
use crate::{ClientConfig, ClientError};

/// Prefix a bare `host:port` with `ws://`.
pub fn normalize_url(url: &str) -> String {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else {
        format!("ws://{}", url)
    }
}

/// Connect and play until the server closes the socket.
pub async fn run(config: ClientConfig) -> Result<(), ClientError> {
    let url = normalize_url(&config.url);
    info!("Connecting to: {}", url);

    let (ws, _) = timeout(config.connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| ClientError::Timeout(config.connect_timeout))?
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    let (mut write, mut read) = ws.split();

    let mut replica = Replica::new();
    let mut events = replica.subscribe();
    let mut behavior = Behavior::new(config.name, config.color, config.vote, config.wander);
    let mut wander = tokio::time::interval(config.wander_interval.max(Duration::from_millis(1)));

    loop {
        let mut outgoing: Vec<Request> = Vec::new();

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match Broadcast::parse(&data) {
                        Ok(message) => {
                            replica.apply(&message);
                        }
                        Err(e) => warn!("Packet error: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Server closed the connection");
                        break;
                    }
                    Some(Err(e)) => return Err(ClientError::Connect(e.to_string())),
                    _ => {}
                }
            }
            _ = wander.tick() => {
                outgoing.extend(behavior.wander_step(&replica));
            }
        }

        while let Ok(event) = events.try_recv() {
            debug!("{:?}", event);
            outgoing.extend(behavior.respond(&replica, &event));
        }

        for request in outgoing {
            write
                .send(Message::Binary(request.encode()))
                .await
                .map_err(|e| ClientError::Connect(e.to_string()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("127.0.0.1:24680"), "ws://127.0.0.1:24680");
        assert_eq!(normalize_url("wss://party.example"), "wss://party.example");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let config = ClientConfig {
            url: "127.0.0.1:1".into(),
            connect_timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        };
        assert!(run(config).await.is_err());
    }
}
