//! Loopback router: one session, one replica per peer, no sockets.
//!
//! Every envelope is encoded and parsed again on its way to a replica so the
//! codec sits on the path exactly as it does over the network.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use protocol::{Broadcast, PeerId, Position, Replica, ReplicaEvent, Request, SERVER_PEER_ID};
use rand::SeedableRng;
use rand::rngs::StdRng;
use server::{Config, Session, SessionError};
use tokio::sync::broadcast;

pub const TICK: Duration = Duration::from_millis(50);

pub struct Loopback {
    pub session: Session,
    pub replicas: BTreeMap<PeerId, Replica>,
    pub now: Instant,
}

#[allow(dead_code)]
impl Loopback {
    pub fn new(config: Config, seed: u64) -> Self {
        let mut session = Session::with_rng(config, StdRng::seed_from_u64(seed));
        session.set_online(true);
        let mut loopback = Self {
            session,
            replicas: BTreeMap::new(),
            now: Instant::now(),
        };
        loopback.connect(SERVER_PEER_ID);
        loopback
    }

    pub fn connect(&mut self, peer_id: PeerId) {
        self.replicas.insert(peer_id, Replica::new());
        self.session.peer_connected(peer_id);
        self.flush();
    }

    /// Connect, register and confirm the representation.
    pub fn join(&mut self, peer_id: PeerId, name: &str) {
        self.connect(peer_id);
        self.request(
            peer_id,
            Request::RegisterName {
                name: name.into(),
                is_rename: false,
            },
        )
        .unwrap();
        self.request(peer_id, Request::SpawnReady).unwrap();
    }

    pub fn request(&mut self, from: PeerId, request: Request) -> Result<(), SessionError> {
        let result = self.session.handle_request(from, request, self.now);
        self.flush();
        result
    }

    pub fn disconnect(&mut self, peer_id: PeerId) {
        self.replicas.remove(&peer_id);
        self.session.peer_disconnected(peer_id, self.now);
        self.flush();
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.session.tick(self.now);
        self.flush();
    }

    pub fn move_to(&mut self, peer_id: PeerId, x: f32, y: f32) {
        self.request(
            peer_id,
            Request::UpdatePosition {
                position: Position::new(x, y),
            },
        )
        .unwrap();
    }

    pub fn flush(&mut self) {
        for envelope in self.session.drain_outbox() {
            let frame = envelope.message.encode();
            let message = Broadcast::parse(&frame).unwrap();
            for (&peer_id, replica) in self.replicas.iter_mut() {
                if envelope.reaches(peer_id) {
                    replica.apply(&message);
                }
            }
        }
    }

    pub fn replica(&self, peer_id: PeerId) -> &Replica {
        &self.replicas[&peer_id]
    }

    /// Lobby -> Voting -> Starting -> Playing with the given votes.
    pub fn play(&mut self, votes: &[(PeerId, protocol::GameType)]) {
        self.request(SERVER_PEER_ID, Request::StartVoting).unwrap();
        for &(peer_id, game_type) in votes {
            self.request(peer_id, Request::CastVote { game_type }).unwrap();
        }
        self.request(SERVER_PEER_ID, Request::EndVotingEarly).unwrap();
        let delay = self.session.config().session.start_delay();
        self.advance(delay);
    }
}

/// Drain every pending event from a subscription.
#[allow(dead_code)]
pub fn events(rx: &mut broadcast::Receiver<ReplicaEvent>) -> Vec<ReplicaEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}
