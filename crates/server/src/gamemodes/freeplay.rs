use std::time::Duration;

use protocol::GameType;

use super::{EndReason, GameContext, Minigame, MinigameStatus};
use crate::config::FreeplayConfig;

/// Minigames whose rules live entirely in their scene. The server only
/// keeps the clock.
pub struct Freeplay {
    game_type: GameType,
    time_limit: Duration,
}

impl Freeplay {
    pub fn new(game_type: GameType, config: &FreeplayConfig) -> Self {
        Self {
            game_type,
            time_limit: Duration::from_secs(config.time_limit_secs),
        }
    }
}

impl Minigame for Freeplay {
    fn game_type(&self) -> GameType {
        self.game_type
    }

    fn time_limit(&self) -> Duration {
        self.time_limit
    }

    fn on_start(&mut self, ctx: &mut GameContext<'_>) -> MinigameStatus {
        if ctx.game.alive.is_empty() {
            return MinigameStatus::Finished;
        }
        ctx.outbox
            .system_message(format!("{} has started!", self.game_type));
        MinigameStatus::Running
    }

    fn on_end(&mut self, _ctx: &mut GameContext<'_>, reason: EndReason) -> Option<String> {
        match reason {
            EndReason::TimeUp => Some(format!("Time's up! {} is over.", self.game_type)),
            EndReason::Ended => Some(format!("{} was ended.", self.game_type)),
            EndReason::Abandoned => None,
        }
    }
}
