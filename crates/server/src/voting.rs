//! Timed minigame vote.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use protocol::{Broadcast, GamePhase, GameType, PeerId};
use rand::Rng;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::Rejection;
use crate::phase::GameSession;
use crate::registry::PeerRecord;
use crate::scheduler::{Scheduler, TimerKind};

/// Result of closing a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub winner: GameType,
    pub counts: BTreeMap<GameType, usize>,
    /// Number of game types that shared the top count.
    pub tied: usize,
}

/// Count votes and pick a winner.
///
/// Ties are broken uniformly at random over the tied types in ascending
/// order, so the draw does not depend on map iteration order. With no votes
/// the default game wins.
pub fn tally<R: Rng>(
    votes: &BTreeMap<PeerId, GameType>,
    default_game: GameType,
    rng: &mut R,
) -> VoteOutcome {
    let mut counts = BTreeMap::new();
    for game_type in votes.values() {
        *counts.entry(*game_type).or_insert(0usize) += 1;
    }

    let Some(&top) = counts.values().max() else {
        return VoteOutcome {
            winner: default_game,
            counts,
            tied: 0,
        };
    };

    let leaders: Vec<GameType> = counts
        .iter()
        .filter(|&(_, &count)| count == top)
        .map(|(&game_type, _)| game_type)
        .collect();
    let winner = leaders[rng.random_range(0..leaders.len())];

    VoteOutcome {
        winner,
        tied: leaders.len(),
        counts,
    }
}

/// Runs the voting window on top of a [`GameSession`].
#[derive(Debug, Clone)]
pub struct VotingCoordinator {
    window: Duration,
    default_game: GameType,
}

impl VotingCoordinator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            window: config.voting_window(),
            default_game: config.default_game,
        }
    }

    /// Lobby -> Voting. Clears old votes and arms the window timer.
    pub fn start(
        &self,
        game: &mut GameSession,
        scheduler: &mut Scheduler,
        now: Instant,
    ) -> Result<Broadcast, Rejection> {
        if game.phase() != GamePhase::Lobby {
            return Err(Rejection::WrongPhase {
                action: "start voting",
                phase: game.phase(),
            });
        }
        game.transition(GamePhase::Voting)?;
        game.votes.clear();
        scheduler.schedule(TimerKind::VotingWindow, now, self.window);
        info!("Voting opened for {:?}", self.window);
        Ok(Broadcast::VotingStarted {
            window_secs: u32::try_from(self.window.as_secs()).unwrap_or(u32::MAX),
        })
    }

    /// Record or overwrite a vote.
    pub fn submit(
        &self,
        game: &mut GameSession,
        voter: &PeerRecord,
        game_type: GameType,
    ) -> Result<Broadcast, Rejection> {
        if game.phase() != GamePhase::Voting {
            return Err(Rejection::WrongPhase {
                action: "vote",
                phase: game.phase(),
            });
        }
        if !voter.in_game {
            return Err(Rejection::NotInGame(voter.peer_id));
        }
        if game_type == GameType::None {
            return Err(Rejection::InvalidGameType);
        }

        game.votes.insert(voter.peer_id, game_type);
        debug!("Peer {} voted for {}", voter.peer_id, game_type);
        Ok(Broadcast::BroadcastVote {
            peer_id: voter.peer_id,
            game_type,
            name: voter.name.clone(),
            color: voter.color,
        })
    }

    /// Close the window, whether it expired or was ended early, and tally.
    /// The caller moves on to Starting with the winner.
    pub fn close<R: Rng>(
        &self,
        game: &GameSession,
        scheduler: &mut Scheduler,
        rng: &mut R,
    ) -> Result<VoteOutcome, Rejection> {
        if game.phase() != GamePhase::Voting {
            return Err(Rejection::WrongPhase {
                action: "end voting",
                phase: game.phase(),
            });
        }
        scheduler.cancel(TimerKind::VotingWindow);
        let outcome = tally(&game.votes, self.default_game, rng);
        info!(
            "Voting closed: {} wins ({} votes, {} tied)",
            outcome.winner,
            game.votes.len(),
            outcome.tied
        );
        Ok(outcome)
    }
}
