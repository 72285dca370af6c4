//! WebSocket transport around the session.
//!
//! One task owns the [`Session`] and the server's own [`Replica`]. Connection
//! tasks talk to it over an mpsc channel of [`SessionCommand`]s and receive
//! encoded broadcasts on a per-connection queue.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use protocol::{PeerId, Replica, Request, SERVER_PEER_ID};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::SessionError;
use crate::session::Session;

pub mod console;

pub use console::ConsoleCommand;

/// Inputs to the session task, processed in arrival order.
#[derive(Debug)]
pub enum SessionCommand {
    /// A socket was accepted; the reply carries its peer id.
    Connect {
        outgoing: mpsc::UnboundedSender<Bytes>,
        reply: oneshot::Sender<PeerId>,
    },
    Disconnect {
        peer_id: PeerId,
    },
    Request {
        peer_id: PeerId,
        request: Request,
    },
    Console(ConsoleCommand),
}

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    ip_connections: HashMap<IpAddr, usize>,
    total_connections: usize,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            ip_connections: HashMap::new(),
            total_connections: 0,
        }
    }

    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }
        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }
        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
            self.total_connections = self.total_connections.saturating_sub(1);
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// A running server.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    commands: mpsc::UnboundedSender<SessionCommand>,
    accept_task: JoinHandle<anyhow::Result<()>>,
}

impl ServerHandle {
    /// Sender for injecting commands, e.g. from the console.
    pub fn commands(&self) -> mpsc::UnboundedSender<SessionCommand> {
        self.commands.clone()
    }

    /// Wait for the accept loop to finish.
    pub async fn wait(self) -> anyhow::Result<()> {
        self.accept_task.await?
    }

    pub fn shutdown(self) {
        self.accept_task.abort();
    }
}

/// Bind, start the session task and the accept loop.
pub async fn start(config: Config) -> anyhow::Result<ServerHandle> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Listening on ws://{}", local_addr);

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(config.clone());
    session.set_online(true);
    tokio::spawn(run_session(
        session,
        commands_rx,
        Duration::from_millis(config.server.tick_interval_ms.max(1)),
        config.server.host_name.clone(),
    ));

    let accept_task = tokio::spawn(accept_loop(listener, commands_tx.clone(), config.server));

    Ok(ServerHandle {
        local_addr,
        commands: commands_tx,
        accept_task,
    })
}

/// Run the server with an operator console on stdin.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let handle = start(config).await?;
    tokio::spawn(console::run(handle.commands()));
    handle.wait().await
}

async fn accept_loop(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<SessionCommand>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip();

        {
            let mut state = conn_state.write().await;
            if !state.try_add_connection(ip, config.max_connections, config.ip_limit) {
                warn!("Connection rejected (limit reached): {}", addr);
                continue;
            }
        }

        let conn_state = Arc::clone(&conn_state);
        let commands = commands.clone();
        tokio::spawn(async move {
            let result = handle_connection(stream, addr, commands).await;

            // Always remove from connection tracking when done
            conn_state.write().await.remove_connection(addr.ip());

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<SessionCommand>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Bytes>();
    let (reply_tx, reply_rx) = oneshot::channel();

    commands
        .send(SessionCommand::Connect {
            outgoing: outgoing_tx,
            reply: reply_tx,
        })
        .map_err(|_| SessionError::TransportUnavailable)?;
    let peer_id = reply_rx
        .await
        .map_err(|_| SessionError::TransportUnavailable)?;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match Request::parse(&data) {
                        Ok(request) => {
                            if commands.send(SessionCommand::Request { peer_id, request }).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Packet error from {}: {}", addr, e),
                    },
                    Some(Ok(Message::Close(_))) => {
                        info!("Peer {} ({}) disconnected", peer_id, addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            frame = outgoing_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write.send(Message::Binary(frame.into())).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
            }
        }
    }

    let _ = commands.send(SessionCommand::Disconnect { peer_id });
    Ok(())
}

/// The single writer: owns the session, hands out peer ids and ticks.
async fn run_session(
    mut session: Session,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    tick_interval: Duration,
    host_name: Option<String>,
) {
    let mut peers: HashMap<PeerId, mpsc::UnboundedSender<Bytes>> = HashMap::new();
    let mut host = Replica::new();
    let mut next_peer_id = SERVER_PEER_ID + 1;

    session.peer_connected(SERVER_PEER_ID);
    if let Some(name) = host_name {
        let now = Instant::now();
        let registered = session
            .handle_request(
                SERVER_PEER_ID,
                Request::RegisterName {
                    name,
                    is_rename: false,
                },
                now,
            )
            .and_then(|_| session.handle_request(SERVER_PEER_ID, Request::SpawnReady, now));
        if let Err(e) = registered {
            warn!("Host player could not join: {}", e);
        }
    }
    deliver(&mut session, &peers, &mut host);

    let mut ticker = tokio::time::interval(tick_interval);
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                let now = Instant::now();
                match command {
                    SessionCommand::Connect { outgoing, reply } => {
                        let peer_id = next_peer_id;
                        next_peer_id += 1;
                        peers.insert(peer_id, outgoing);
                        session.peer_connected(peer_id);
                        if reply.send(peer_id).is_err() {
                            peers.remove(&peer_id);
                        }
                    }
                    SessionCommand::Disconnect { peer_id } => {
                        peers.remove(&peer_id);
                        session.peer_disconnected(peer_id, now);
                    }
                    SessionCommand::Request { peer_id, request } => {
                        // Rejections are logged and answered inside the session.
                        let _ = session.handle_request(peer_id, request, now);
                    }
                    SessionCommand::Console(command) => {
                        console::execute(&mut session, &host, command, now);
                    }
                }
            }
            _ = ticker.tick() => session.tick(Instant::now()),
        }
        deliver(&mut session, &peers, &mut host);
    }

    session.set_online(false);
    info!("Session task stopped");
}

/// Route queued envelopes to the host replica and to connections.
fn deliver(
    session: &mut Session,
    peers: &HashMap<PeerId, mpsc::UnboundedSender<Bytes>>,
    host: &mut Replica,
) {
    for envelope in session.drain_outbox() {
        if envelope.reaches(SERVER_PEER_ID) {
            host.apply(&envelope.message);
        }
        let frame = envelope.message.encode();
        for (&peer_id, outgoing) in peers {
            if envelope.reaches(peer_id) {
                // A closed queue means the connection is already going away.
                let _ = outgoing.send(frame.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_limits() {
        let mut state = ConnectionState::new();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(state.try_add_connection(a, 3, 2));
        assert!(state.try_add_connection(a, 3, 2));
        assert!(!state.try_add_connection(a, 3, 2));
        assert!(state.try_add_connection(b, 3, 2));
        assert!(!state.try_add_connection(b, 3, 2));

        state.remove_connection(a);
        assert!(state.try_add_connection(b, 3, 2));
        state.remove_connection(b);
        state.remove_connection(b);
        state.remove_connection(b);
        assert_eq!(state.total_connections, 1);
    }
}
