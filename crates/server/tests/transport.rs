//! Smoke test over a real WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use protocol::{Broadcast, GamePhase, GameType, Request};
use server::Config;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn config() -> Config {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1".into();
    config.server.port = 0;
    config.server.tick_interval_ms = 10;
    config.server.host_name = Some("Host".into());
    config
}

async fn next_broadcast<S>(read: &mut S) -> Broadcast
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Binary(data) = frame {
            return Broadcast::parse(&data).unwrap();
        }
    }
}

#[tokio::test]
async fn register_over_websocket() {
    let handle = server::start(config()).await.unwrap();
    let url = format!("ws://{}", handle.local_addr);

    let (ws, _) = connect_async(url.as_str()).await.unwrap();
    let (mut write, mut read) = ws.split();

    assert_eq!(
        next_broadcast(&mut read).await,
        Broadcast::Welcome { peer_id: 2 }
    );

    let hello = Request::RegisterName {
        name: "Ada".into(),
        is_rename: false,
    };
    write.send(Message::Binary(hello.encode().into())).await.unwrap();

    // The snapshot lists the host first, then the phase, then our own record.
    let mut saw_host = false;
    let mut saw_phase = false;
    loop {
        match next_broadcast(&mut read).await {
            Broadcast::AnnounceName { peer_id: 1, name, .. } => {
                assert_eq!(name, "Host");
                saw_host = true;
            }
            Broadcast::UpdateClientGameState { phase, game_type } => {
                assert_eq!(phase, GamePhase::Lobby);
                assert_eq!(game_type, GameType::None);
                saw_phase = true;
            }
            Broadcast::AnnounceName { peer_id: 2, name, is_rename } => {
                assert_eq!(name, "Ada");
                assert!(!is_rename);
                break;
            }
            _ => {}
        }
    }
    assert!(saw_host && saw_phase);

    // Server-only requests from a client are answered with an explanation.
    write
        .send(Message::Binary(Request::StartVoting.encode().into()))
        .await
        .unwrap();
    loop {
        if let Broadcast::SystemMessage { text } = next_broadcast(&mut read).await {
            if text.starts_with("Only the server") {
                break;
            }
        }
    }

    handle.shutdown();
}
