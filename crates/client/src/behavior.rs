//! What a headless peer says in reply to what its replica hears.

use glam::Vec2;
use protocol::{Color, GamePhase, GameType, Position, Replica, ReplicaEvent, Request};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Half-width of the square a wandering peer moves in.
const WANDER_EXTENT: f32 = 20.0;
/// Distance covered per wander step.
const WANDER_STEP: f32 = 0.5;

/// Reacts to replica events with requests.
#[derive(Debug)]
pub struct Behavior {
    name: String,
    color: Option<Color>,
    vote: Option<GameType>,
    wander: bool,
    position: Position,
    target: Vec2,
    rng: StdRng,
}

impl Behavior {
    pub fn new(name: String, color: Option<Color>, vote: Option<GameType>, wander: bool) -> Self {
        Self::with_rng(name, color, vote, wander, StdRng::from_os_rng())
    }

    pub fn with_rng(
        name: String,
        color: Option<Color>,
        vote: Option<GameType>,
        wander: bool,
        rng: StdRng,
    ) -> Self {
        Self {
            name,
            color,
            vote,
            wander,
            position: Position::ZERO,
            target: Vec2::ZERO,
            rng,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Requests owed for one event.
    pub fn respond(&mut self, replica: &Replica, event: &ReplicaEvent) -> Vec<Request> {
        let local = replica.local_id();
        match event {
            ReplicaEvent::Welcomed { peer_id } => {
                info!("Connected as peer {}", peer_id);
                let mut requests = vec![Request::RegisterName {
                    name: self.name.clone(),
                    is_rename: false,
                }];
                if let Some(color) = self.color {
                    requests.push(Request::RegisterColor { color });
                }
                requests
            }
            // Our own record exists now, so the representation can be confirmed.
            ReplicaEvent::PeerJoined { peer_id, .. } if Some(*peer_id) == local => {
                vec![Request::SpawnReady]
            }
            ReplicaEvent::PeerJoined { name, .. } => {
                debug!("{} joined", name);
                Vec::new()
            }
            ReplicaEvent::VotingStarted { window_secs } => match self.vote {
                Some(game_type) => {
                    info!("Voting for {} ({}s window)", game_type, window_secs);
                    vec![Request::CastVote { game_type }]
                }
                None => Vec::new(),
            },
            ReplicaEvent::LoadLevel { game_type } => {
                info!("Loading {}", game_type);
                vec![Request::LevelLoaded]
            }
            ReplicaEvent::PhaseChanged {
                phase: GamePhase::Lobby,
                ..
            } => {
                self.position = Position::ZERO;
                self.target = Vec2::ZERO;
                Vec::new()
            }
            ReplicaEvent::TaggerChanged { tagger } if Some(*tagger) == local => {
                info!("You're it!");
                Vec::new()
            }
            ReplicaEvent::SystemMessage { text } => {
                info!("[system] {}", text);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// One wander step, only while a round is being played.
    pub fn wander_step(&mut self, replica: &Replica) -> Option<Request> {
        if !self.wander || replica.phase() != GamePhase::Playing {
            return None;
        }

        if self.position.distance(self.target) < WANDER_STEP {
            self.target = Vec2::new(
                self.rng.random_range(-WANDER_EXTENT..WANDER_EXTENT),
                self.rng.random_range(-WANDER_EXTENT..WANDER_EXTENT),
            );
        }
        let toward = self.target - self.position;
        self.position += toward.clamp_length_max(WANDER_STEP);

        Some(Request::UpdatePosition {
            position: self.position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Broadcast;

    fn behavior(vote: Option<GameType>, wander: bool) -> Behavior {
        Behavior::with_rng(
            "Ada".into(),
            Some(Color::new(0, 128, 255)),
            vote,
            wander,
            StdRng::seed_from_u64(7),
        )
    }

    /// Apply a broadcast and collect every request the behavior owes for it.
    fn feed(behavior: &mut Behavior, replica: &mut Replica, message: Broadcast) -> Vec<Request> {
        let mut rx = replica.subscribe();
        replica.apply(&message);
        let mut requests = Vec::new();
        while let Ok(event) = rx.try_recv() {
            requests.extend(behavior.respond(replica, &event));
        }
        requests
    }

    #[test]
    fn test_welcome_registers_then_own_join_spawns() {
        let mut b = behavior(None, false);
        let mut replica = Replica::new();

        let requests = feed(&mut b, &mut replica, Broadcast::Welcome { peer_id: 3 });
        assert_eq!(
            requests,
            vec![
                Request::RegisterName {
                    name: "Ada".into(),
                    is_rename: false
                },
                Request::RegisterColor {
                    color: Color::new(0, 128, 255)
                },
            ]
        );

        let other = Broadcast::AnnounceName {
            peer_id: 2,
            name: "Bob".into(),
            is_rename: false,
        };
        assert!(feed(&mut b, &mut replica, other).is_empty());

        let own = Broadcast::AnnounceName {
            peer_id: 3,
            name: "Ada".into(),
            is_rename: false,
        };
        assert_eq!(feed(&mut b, &mut replica, own), vec![Request::SpawnReady]);
    }

    #[test]
    fn test_votes_only_when_configured() {
        let mut replica = Replica::new();
        let started = Broadcast::VotingStarted { window_secs: 10 };

        let mut silent = behavior(None, false);
        assert!(feed(&mut silent, &mut replica, started.clone()).is_empty());

        let mut voter = behavior(Some(GameType::Race), false);
        assert_eq!(
            feed(&mut voter, &mut replica, started),
            vec![Request::CastVote {
                game_type: GameType::Race
            }]
        );
    }

    #[test]
    fn test_level_load_is_acknowledged() {
        let mut b = behavior(None, false);
        let mut replica = Replica::new();
        let requests = feed(
            &mut b,
            &mut replica,
            Broadcast::LoadGameLevel {
                game_type: GameType::Tag,
            },
        );
        assert_eq!(requests, vec![Request::LevelLoaded]);
    }

    #[test]
    fn test_wander_only_while_playing() {
        let mut b = behavior(None, true);
        let mut replica = Replica::new();
        assert_eq!(b.wander_step(&replica), None);

        replica.apply(&Broadcast::UpdateClientGameState {
            phase: GamePhase::Playing,
            game_type: GameType::Tag,
        });
        let mut last = b.position();
        for _ in 0..50 {
            let Some(Request::UpdatePosition { position }) = b.wander_step(&replica) else {
                panic!("expected a position update");
            };
            assert!(position.distance(last) <= WANDER_STEP + 1e-4);
            assert!(position.x.abs() <= WANDER_EXTENT && position.y.abs() <= WANDER_EXTENT);
            last = position;
        }

        let mut still = behavior(None, false);
        assert_eq!(still.wander_step(&replica), None);
    }
}
