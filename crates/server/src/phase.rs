//! Game phase state machine.

use std::collections::{BTreeMap, BTreeSet};

use protocol::{Broadcast, GamePhase, GameType, PeerId};
use tracing::info;

use crate::error::Rejection;

/// Whether `from -> to` is a regular forward step.
pub fn is_forward(from: GamePhase, to: GamePhase) -> bool {
    matches!(
        (from, to),
        (GamePhase::Lobby, GamePhase::Voting)
            | (GamePhase::Voting, GamePhase::Starting)
            | (GamePhase::Starting, GamePhase::Playing)
            | (GamePhase::Playing, GamePhase::GameOver)
            | (GamePhase::GameOver, GamePhase::Lobby)
    )
}

/// What a departing peer took with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Departure {
    pub had_vote: bool,
    pub was_alive: bool,
    pub was_tagger: bool,
}

/// Shared game state owned by the session.
#[derive(Debug, Default)]
pub struct GameSession {
    phase: GamePhase,
    game_type: GameType,
    pub votes: BTreeMap<PeerId, GameType>,
    pub tagger: Option<PeerId>,
    pub alive: BTreeSet<PeerId>,
}

impl GameSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn set_game_type(&mut self, game_type: GameType) {
        self.game_type = game_type;
    }

    /// Move to `to` if allowed.
    pub fn transition(&mut self, to: GamePhase) -> Result<(), Rejection> {
        if !is_forward(self.phase, to) {
            return Err(Rejection::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        info!("Phase {} -> {}", self.phase, to);
        self.enter(to);
        Ok(())
    }

    /// Drop back to Lobby from anywhere. Returns false when already there.
    pub fn abort(&mut self) -> bool {
        if self.phase == GamePhase::Lobby {
            return false;
        }
        info!("Phase {} -> {} (aborted)", self.phase, GamePhase::Lobby);
        self.enter(GamePhase::Lobby);
        true
    }

    fn enter(&mut self, to: GamePhase) {
        self.phase = to;
        if to != GamePhase::Playing {
            self.tagger = None;
        }
        if to == GamePhase::Lobby {
            self.game_type = GameType::None;
            self.votes.clear();
            self.alive.clear();
        }
    }

    /// Remove every trace of a peer.
    pub fn prune(&mut self, peer_id: PeerId) -> Departure {
        let was_tagger = self.tagger == Some(peer_id);
        if was_tagger {
            self.tagger = None;
        }
        Departure {
            had_vote: self.votes.remove(&peer_id).is_some(),
            was_alive: self.alive.remove(&peer_id),
            was_tagger,
        }
    }

    pub fn state_message(&self) -> Broadcast {
        Broadcast::UpdateClientGameState {
            phase: self.phase,
            game_type: self.game_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut game = GameSession::new();
        for phase in [
            GamePhase::Voting,
            GamePhase::Starting,
            GamePhase::Playing,
            GamePhase::GameOver,
            GamePhase::Lobby,
        ] {
            game.transition(phase).unwrap();
            assert_eq!(game.phase(), phase);
        }
    }

    #[test]
    fn test_skips_are_rejected() {
        let mut game = GameSession::new();
        assert_eq!(
            game.transition(GamePhase::Playing),
            Err(Rejection::InvalidTransition {
                from: GamePhase::Lobby,
                to: GamePhase::Playing
            })
        );
        assert_eq!(
            game.transition(GamePhase::Lobby),
            Err(Rejection::InvalidTransition {
                from: GamePhase::Lobby,
                to: GamePhase::Lobby
            })
        );
        assert_eq!(game.phase(), GamePhase::Lobby);
    }

    #[test]
    fn test_lobby_clears_working_state() {
        let mut game = GameSession::new();
        game.transition(GamePhase::Voting).unwrap();
        game.votes.insert(2, GameType::Tag);
        game.transition(GamePhase::Starting).unwrap();
        game.set_game_type(GameType::Tag);
        game.transition(GamePhase::Playing).unwrap();
        game.alive.extend([2, 3]);
        game.tagger = Some(2);

        game.transition(GamePhase::GameOver).unwrap();
        assert_eq!(game.tagger, None);

        assert!(game.abort());
        assert!(!game.abort());
        assert!(game.votes.is_empty());
        assert!(game.alive.is_empty());
        assert_eq!(game.game_type(), GameType::None);
    }

    #[test]
    fn test_prune() {
        let mut game = GameSession::new();
        game.votes.insert(3, GameType::Race);
        game.alive.insert(3);
        game.tagger = Some(3);

        assert_eq!(
            game.prune(3),
            Departure {
                had_vote: true,
                was_alive: true,
                was_tagger: true
            }
        );
        assert_eq!(game.prune(3), Departure::default());
    }
}
