use std::time::Duration;

use protocol::{GameType, PeerId};
use rand::rngs::StdRng;

use crate::colors::ColorOverrides;
use crate::config::Config;
use crate::phase::GameSession;
use crate::registry::PeerRegistry;
use crate::session::outbox::Outbox;

pub mod freeplay;
pub mod tag;

/// Session state a minigame may read and drive.
pub struct GameContext<'a> {
    pub registry: &'a PeerRegistry,
    pub game: &'a mut GameSession,
    pub overrides: &'a mut ColorOverrides,
    pub outbox: &'a mut Outbox,
    pub rng: &'a mut StdRng,
}

/// Whether the round should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinigameStatus {
    Running,
    Finished,
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    TimeUp,
    /// The server ended it.
    Ended,
    /// Nobody is left to play.
    Abandoned,
}

pub trait Minigame: Send {
    fn game_type(&self) -> GameType;

    fn time_limit(&self) -> Duration;

    /// Called on entering Playing. `ctx.game.alive` is already filled.
    fn on_start(&mut self, ctx: &mut GameContext<'_>) -> MinigameStatus;

    /// Called once per server tick while Playing.
    fn on_tick(&mut self, _ctx: &mut GameContext<'_>) -> MinigameStatus {
        MinigameStatus::Running
    }

    /// Called after `peer_id` was pruned from the game session.
    fn on_peer_left(
        &mut self,
        ctx: &mut GameContext<'_>,
        _peer_id: PeerId,
        _was_tagger: bool,
    ) -> MinigameStatus {
        if ctx.game.alive.is_empty() {
            MinigameStatus::Finished
        } else {
            MinigameStatus::Running
        }
    }

    /// Called on leaving Playing. Returns a line for the chat.
    fn on_end(&mut self, ctx: &mut GameContext<'_>, reason: EndReason) -> Option<String>;
}

pub fn get_minigame(game_type: GameType, config: &Config) -> Box<dyn Minigame> {
    match game_type {
        GameType::Tag => Box::new(tag::Tag::new(&config.tag)),
        other => Box::new(freeplay::Freeplay::new(other, &config.freeplay)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_votable_game_has_a_minigame() {
        let config = Config::default();
        for game_type in GameType::VOTABLE {
            assert_eq!(get_minigame(game_type, &config).game_type(), game_type);
        }
        assert_eq!(
            get_minigame(GameType::Tag, &config).time_limit(),
            Duration::from_secs(config.tag.time_limit_secs)
        );
        assert_eq!(
            get_minigame(GameType::Race, &config).time_limit(),
            Duration::from_secs(config.freeplay.time_limit_secs)
        );
    }
}
