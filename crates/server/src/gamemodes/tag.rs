//! Tag minigame.
//!
//! One peer is "it". Each tick the tagger is checked against every other
//! alive peer in ascending id order and the first one within the tag radius
//! becomes the new tagger. At most one handover happens per tick. Whoever
//! is still it when the clock runs out loses.

use std::collections::BTreeSet;
use std::time::Duration;

use protocol::{Broadcast, Color, GameType, PeerId};
use rand::Rng;
use tracing::{debug, info};

use super::{EndReason, GameContext, Minigame, MinigameStatus};
use crate::config::TagConfig;

/// A tagger that may not tag `peer_id` back until `until_tick` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grace {
    peer_id: PeerId,
    until_tick: u64,
}

pub struct Tag {
    radius: f32,
    time_limit: Duration,
    grace_ticks: u32,
    tagger_color: Color,
    runner_color: Color,
    tick: u64,
    grace: Option<Grace>,
}

impl Tag {
    pub fn new(config: &TagConfig) -> Self {
        Self {
            radius: config.radius,
            time_limit: Duration::from_secs(config.time_limit_secs),
            grace_ticks: config.tag_back_grace_ticks,
            tagger_color: config.tagger_color,
            runner_color: config.runner_color,
            tick: 0,
            grace: None,
        }
    }

    fn pick_tagger<R: Rng>(alive: &BTreeSet<PeerId>, rng: &mut R) -> Option<PeerId> {
        if alive.is_empty() {
            return None;
        }
        alive.iter().nth(rng.random_range(0..alive.len())).copied()
    }

    /// Override colors for a given tagger: red for it, white for the rest.
    fn assignment(&self, alive: &BTreeSet<PeerId>, tagger: PeerId) -> Vec<(PeerId, Color)> {
        alive
            .iter()
            .map(|&peer_id| {
                let color = if peer_id == tagger {
                    self.tagger_color
                } else {
                    self.runner_color
                };
                (peer_id, color)
            })
            .collect()
    }

    /// First alive peer the tagger can reach this tick.
    fn find_target(&self, ctx: &GameContext<'_>, tagger: PeerId) -> Option<PeerId> {
        let origin = ctx.registry.get(tagger)?.position?;
        ctx.game
            .alive
            .iter()
            .copied()
            .filter(|&peer_id| peer_id != tagger)
            .filter(|&peer_id| match self.grace {
                Some(grace) => !(grace.peer_id == peer_id && self.tick <= grace.until_tick),
                None => true,
            })
            .find(|&peer_id| {
                ctx.registry
                    .get(peer_id)
                    .and_then(|record| record.position)
                    .is_some_and(|position| origin.distance(position) <= self.radius)
            })
    }

    fn hand_over(&mut self, ctx: &mut GameContext<'_>, previous: PeerId, tagger: PeerId) {
        ctx.game.tagger = Some(tagger);
        let colors = ctx.overrides.apply(&[
            (previous, self.runner_color),
            (tagger, self.tagger_color),
        ]);
        self.grace = (self.grace_ticks > 0).then(|| Grace {
            peer_id: previous,
            until_tick: self.tick + self.grace_ticks as u64,
        });
        info!("Peer {} tagged peer {}", previous, tagger);
        ctx.outbox.broadcast(Broadcast::AnnounceTagChange {
            previous,
            tagger,
            colors,
        });
    }
}

impl Minigame for Tag {
    fn game_type(&self) -> GameType {
        GameType::Tag
    }

    fn time_limit(&self) -> Duration {
        self.time_limit
    }

    fn on_start(&mut self, ctx: &mut GameContext<'_>) -> MinigameStatus {
        self.tick = 0;
        self.grace = None;

        let Some(tagger) = Self::pick_tagger(&ctx.game.alive, ctx.rng) else {
            return MinigameStatus::Finished;
        };
        ctx.game.tagger = Some(tagger);

        ctx.overrides.snapshot(ctx.game.alive.iter().filter_map(|&peer_id| {
            ctx.registry
                .get(peer_id)
                .map(|record| (peer_id, record.color))
        }));
        let colors = ctx
            .overrides
            .apply(&self.assignment(&ctx.game.alive, tagger));

        info!("Peer {} is it", tagger);
        ctx.outbox
            .broadcast(Broadcast::AnnounceTagger { tagger, colors });
        ctx.outbox
            .system_message(format!("{} is it!", ctx.registry.display_name(tagger)));
        MinigameStatus::Running
    }

    fn on_tick(&mut self, ctx: &mut GameContext<'_>) -> MinigameStatus {
        self.tick += 1;
        let Some(tagger) = ctx.game.tagger else {
            return MinigameStatus::Running;
        };
        if let Some(target) = self.find_target(ctx, tagger) {
            self.hand_over(ctx, tagger, target);
        }
        MinigameStatus::Running
    }

    fn on_peer_left(
        &mut self,
        ctx: &mut GameContext<'_>,
        peer_id: PeerId,
        was_tagger: bool,
    ) -> MinigameStatus {
        if ctx.game.alive.is_empty() {
            return MinigameStatus::Finished;
        }
        if self.grace.is_some_and(|grace| grace.peer_id == peer_id) {
            self.grace = None;
        }
        if !was_tagger {
            return MinigameStatus::Running;
        }

        let Some(tagger) = Self::pick_tagger(&ctx.game.alive, ctx.rng) else {
            return MinigameStatus::Finished;
        };
        debug!("Tagger {} left, handing over to {}", peer_id, tagger);
        ctx.game.tagger = Some(tagger);
        let colors = ctx.overrides.apply(&[(tagger, self.tagger_color)]);
        ctx.outbox.broadcast(Broadcast::AnnounceTagChange {
            previous: peer_id,
            tagger,
            colors,
        });
        ctx.outbox.system_message(format!(
            "The tagger left. {} is it now!",
            ctx.registry.display_name(tagger)
        ));
        MinigameStatus::Running
    }

    fn on_end(&mut self, ctx: &mut GameContext<'_>, reason: EndReason) -> Option<String> {
        let tagger = ctx.game.tagger.map(|peer_id| ctx.registry.display_name(peer_id));
        match (reason, tagger) {
            (EndReason::TimeUp, Some(name)) => Some(format!("Time's up! {name} is still it.")),
            (EndReason::TimeUp, None) => Some("Time's up!".to_string()),
            (EndReason::Ended, _) => Some("Tag was ended.".to_string()),
            (EndReason::Abandoned, _) => None,
        }
    }
}
