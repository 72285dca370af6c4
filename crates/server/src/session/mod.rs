//! The authoritative session.
//!
//! A [`Session`] is a plain value with a single owner. Every input (a
//! connect, a disconnect, a request, a tick) is handled to completion before
//! the next one, and everything that has to reach peers is queued in the
//! [`Outbox`] for the transport to drain.

use std::time::Instant;

use protocol::{Authority, Broadcast, Color, GamePhase, GameType, PeerId, Request, SERVER_PEER_ID};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::colors::ColorOverrides;
use crate::config::Config;
use crate::error::{Rejection, SessionError};
use crate::gamemodes::{get_minigame, EndReason, GameContext, Minigame, MinigameStatus};
use crate::phase::GameSession;
use crate::registry::{PeerRecord, PeerRegistry, Registration};
use crate::scheduler::{Scheduler, TimerKind};
use crate::teams::TeamRegistry;
use crate::voting::{VoteOutcome, VotingCoordinator};

pub mod outbox;

pub use outbox::{Envelope, Outbox, Target};

pub struct Session {
    config: Config,
    online: bool,
    registry: PeerRegistry,
    teams: TeamRegistry,
    game: GameSession,
    voting: VotingCoordinator,
    minigame: Option<Box<dyn Minigame>>,
    overrides: ColorOverrides,
    scheduler: Scheduler,
    outbox: Outbox,
    rng: StdRng,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Build a session with a fixed random source.
    pub fn with_rng(config: Config, rng: StdRng) -> Self {
        Self {
            registry: PeerRegistry::new(config.session.max_name_length),
            teams: TeamRegistry::from_config(&config.teams),
            game: GameSession::new(),
            voting: VotingCoordinator::new(&config.session),
            minigame: None,
            overrides: ColorOverrides::new(),
            scheduler: Scheduler::new(),
            outbox: Outbox::new(),
            online: false,
            config,
            rng,
        }
    }

    /// Mark whether a transport is accepting peers. Registration is refused
    /// while offline.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> GamePhase {
        self.game.phase()
    }

    pub fn game_type(&self) -> GameType {
        self.game.game_type()
    }

    pub fn game(&self) -> &GameSession {
        &self.game
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn teams(&self) -> &TeamRegistry {
        &self.teams
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn overrides(&self) -> &ColorOverrides {
        &self.overrides
    }

    /// Take everything queued for delivery.
    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.outbox.drain()
    }

    /// Server-authored chat line for everyone.
    pub fn announce(&mut self, text: impl Into<String>) {
        self.outbox.system_message(text);
    }

    /// A transport connection was accepted under `peer_id`.
    pub fn peer_connected(&mut self, peer_id: PeerId) {
        debug!("Peer {} connected", peer_id);
        self.outbox
            .unicast(peer_id, Broadcast::Welcome { peer_id });
        self.outbox.unicast(
            peer_id,
            Broadcast::SystemMessage {
                text: format!("Welcome to {}!", self.config.server.name),
            },
        );
    }

    /// A transport connection closed. Unknown peers are ignored.
    pub fn peer_disconnected(&mut self, peer_id: PeerId, now: Instant) {
        self.scheduler.cancel(TimerKind::SpawnWait(peer_id));
        let Some(record) = self.registry.remove(peer_id) else {
            debug!("Unregistered peer {} disconnected", peer_id);
            return;
        };

        self.teams.leave(peer_id);
        self.overrides.forget(peer_id);
        let departure = self.game.prune(peer_id);
        info!("{} (peer {}) left", record.name, peer_id);

        self.outbox
            .broadcast(Broadcast::AnnouncePeerLeft { peer_id });
        self.outbox
            .system_message(format!("{} left.", record.name));

        if departure.had_vote {
            debug!("Dropped the vote of peer {}", peer_id);
        }

        match self.game.phase() {
            GamePhase::Playing if departure.was_alive => {
                let status = self.with_minigame(|minigame, ctx| {
                    minigame.on_peer_left(ctx, peer_id, departure.was_tagger)
                });
                if status == Some(MinigameStatus::Finished) {
                    log_failure(self.end_game(EndReason::Abandoned, now));
                }
            }
            GamePhase::Starting => {
                if self.all_levels_loaded() {
                    log_failure(self.begin_playing(now));
                }
            }
            _ => {}
        }

        if self.registry.in_game_ids().is_empty() && self.game.abort() {
            info!("Every player left, returning to the lobby");
            self.reset_for_lobby();
        }
    }

    /// Handle one request from `from`.
    ///
    /// Rejections leave the session untouched, are logged, and are explained
    /// to the sender with a system message.
    pub fn handle_request(
        &mut self,
        from: PeerId,
        request: Request,
        now: Instant,
    ) -> Result<(), SessionError> {
        let result = self.dispatch(from, request, now);
        if let Err(err) = &result {
            self.report(from, err);
        }
        result
    }

    fn report(&mut self, from: PeerId, err: &SessionError) {
        match err {
            SessionError::InvalidRequest(Rejection::UnknownPeer(_)) => {
                debug!("Ignoring request from unregistered peer {}", from);
            }
            SessionError::InvalidRequest(rejection) => {
                warn!("Rejected request from peer {}: {}", from, rejection);
                if let Some(text) = rejection.explanation() {
                    self.outbox
                        .unicast(from, Broadcast::SystemMessage { text });
                }
            }
            other => warn!("Request from peer {} failed: {}", from, other),
        }
    }

    fn dispatch(&mut self, from: PeerId, request: Request, now: Instant) -> Result<(), SessionError> {
        if from == 0 {
            return Err(Rejection::InvalidPeerId.into());
        }
        if request.authority() == Authority::ServerOnly && from != SERVER_PEER_ID {
            return Err(Rejection::ServerOnly(server_action(&request)).into());
        }

        match request {
            Request::RegisterName { name, is_rename } => self.register(from, &name, is_rename, now),
            Request::RegisterColor { color } => self.update_color(from, color, now),
            Request::RegisterCosmetics {
                expression_id,
                hat_id,
                character_id,
            } => {
                self.registry
                    .update_cosmetics(from, &expression_id, &hat_id, &character_id)?;
                self.outbox.broadcast(Broadcast::AnnounceCosmetics {
                    peer_id: from,
                    expression_id,
                    hat_id,
                    character_id,
                });
                Ok(())
            }
            Request::SpawnReady => self.spawn_ready(from),
            Request::UpdatePosition { position } => self.registry.set_position(from, position),
            Request::JoinTeam { team_id } => {
                self.registry.require(from)?;
                if self.game.phase() != GamePhase::Lobby {
                    return Err(Rejection::WrongPhase {
                        action: "change teams",
                        phase: self.game.phase(),
                    }
                    .into());
                }
                for team in self.teams.join(from, team_id)? {
                    self.outbox.broadcast(Broadcast::AnnounceTeam { team });
                }
                Ok(())
            }
            Request::LeaveTeam => {
                self.registry.require(from)?;
                if let Some(team) = self.teams.leave(from) {
                    self.outbox.broadcast(Broadcast::AnnounceTeam { team });
                }
                Ok(())
            }
            Request::LevelLoaded => self.level_loaded(from, now),
            Request::StartVoting => {
                let started = self
                    .voting
                    .start(&mut self.game, &mut self.scheduler, now)?;
                self.outbox.broadcast(self.game.state_message());
                self.outbox.broadcast(started);
                self.outbox.system_message("Voting has started! Pick a game.");
                Ok(())
            }
            Request::CastVote { game_type } => {
                let voter = self.registry.require(from)?;
                let vote = self.voting.submit(&mut self.game, voter, game_type)?;
                self.outbox.broadcast(vote);
                Ok(())
            }
            Request::EndVotingEarly => self.close_voting(now),
            Request::EndGame => {
                if self.game.phase() != GamePhase::Playing {
                    return Err(Rejection::WrongPhase {
                        action: "end the game",
                        phase: self.game.phase(),
                    }
                    .into());
                }
                self.end_game(EndReason::Ended, now)
            }
        }
    }

    fn register(
        &mut self,
        from: PeerId,
        name: &str,
        is_rename: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        if !self.online {
            return Err(SessionError::TransportUnavailable);
        }
        let in_game = self.game.phase() == GamePhase::Lobby;

        match self.registry.register(from, name, is_rename, in_game)? {
            Registration::Joined => {
                self.announce_join(from, now);
            }
            Registration::Renamed { previous } => {
                let name = self.registry.display_name(from);
                if name == previous {
                    debug!("Peer {} re-registered as {}", from, name);
                    return Ok(());
                }
                info!("Peer {} renamed from {} to {}", from, previous, name);
                self.outbox.broadcast(Broadcast::AnnounceName {
                    peer_id: from,
                    name: name.clone(),
                    is_rename: true,
                });
                self.outbox
                    .system_message(format!("{previous} is now known as {name}."));
            }
        }
        Ok(())
    }

    fn announce_join(&mut self, peer_id: PeerId, now: Instant) {
        self.send_snapshot(peer_id);

        let Some(record) = self.registry.get(peer_id) else {
            return;
        };
        let name = record.name.clone();
        let in_game = record.in_game;
        info!("{} joined as peer {}", name, peer_id);

        self.outbox.broadcast(Broadcast::AnnounceName {
            peer_id,
            name: name.clone(),
            is_rename: false,
        });
        self.outbox.broadcast_except(
            peer_id,
            Broadcast::SystemMessage {
                text: format!("{name} joined the party."),
            },
        );
        if !in_game {
            self.outbox.unicast(
                peer_id,
                Broadcast::SystemMessage {
                    text: "A round is in progress. You will play from the next lobby.".into(),
                },
            );
        }

        // Wait for the representation before showing the initial color.
        self.scheduler.schedule(
            TimerKind::SpawnWait(peer_id),
            now,
            self.config.session.spawn_wait(),
        );
        if let Some(record) = self.registry.get_mut(peer_id) {
            record.color_pending = true;
        }
    }

    /// Replay the current state of everyone else to a newly joined peer.
    fn send_snapshot(&mut self, peer_id: PeerId) {
        let others: Vec<&PeerRecord> = self
            .registry
            .records()
            .filter(|record| record.peer_id != peer_id)
            .collect();

        for record in others {
            self.outbox.unicast(
                peer_id,
                Broadcast::AnnounceName {
                    peer_id: record.peer_id,
                    name: record.name.clone(),
                    is_rename: false,
                },
            );
            self.outbox.unicast(
                peer_id,
                Broadcast::AnnounceColor {
                    peer_id: record.peer_id,
                    color: record.color,
                },
            );
            if !(record.expression_id.is_empty()
                && record.hat_id.is_empty()
                && record.character_id.is_empty())
            {
                self.outbox.unicast(
                    peer_id,
                    Broadcast::AnnounceCosmetics {
                        peer_id: record.peer_id,
                        expression_id: record.expression_id.clone(),
                        hat_id: record.hat_id.clone(),
                        character_id: record.character_id.clone(),
                    },
                );
            }
            if record.spawned {
                self.outbox.unicast(
                    peer_id,
                    Broadcast::SpawnPeer {
                        peer_id: record.peer_id,
                        forced: false,
                    },
                );
            }
        }

        for team in self.teams.snapshot() {
            self.outbox
                .unicast(peer_id, Broadcast::AnnounceTeam { team });
        }

        self.outbox.unicast(peer_id, self.game.state_message());

        if self.game.phase() == GamePhase::Voting {
            for (&voter, &game_type) in &self.game.votes {
                if let Some(record) = self.registry.get(voter) {
                    self.outbox.unicast(
                        peer_id,
                        Broadcast::BroadcastVote {
                            peer_id: voter,
                            game_type,
                            name: record.name.clone(),
                            color: record.color,
                        },
                    );
                }
            }
        }

        let colors = self.overrides.active();
        match self.game.tagger {
            Some(tagger) => self
                .outbox
                .unicast(peer_id, Broadcast::AnnounceTagger { tagger, colors }),
            None if !colors.is_empty() => self
                .outbox
                .unicast(peer_id, Broadcast::ApplyColorOverrides { colors }),
            None => {}
        }
    }

    fn update_color(&mut self, from: PeerId, color: Color, now: Instant) -> Result<(), SessionError> {
        match self.registry.update_color(from, color) {
            Ok(()) => {
                self.overrides.record_canonical(from, color);
                self.outbox
                    .broadcast(Broadcast::AnnounceColor { peer_id: from, color });
                Ok(())
            }
            Err(SessionError::MissingReplica(peer_id)) => {
                self.overrides.record_canonical(peer_id, color);
                debug!("Color of peer {} deferred until it spawns", peer_id);
                if !self.scheduler.is_scheduled(TimerKind::SpawnWait(peer_id)) {
                    self.scheduler.schedule(
                        TimerKind::SpawnWait(peer_id),
                        now,
                        self.config.session.spawn_wait(),
                    );
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn spawn_ready(&mut self, from: PeerId) -> Result<(), SessionError> {
        let color_pending = self.registry.mark_spawned(from)?;
        self.scheduler.cancel(TimerKind::SpawnWait(from));
        self.outbox.broadcast(Broadcast::SpawnPeer {
            peer_id: from,
            forced: false,
        });
        if color_pending {
            self.broadcast_color(from);
        }
        Ok(())
    }

    /// The spawn wait ran out: respawn the peer and deliver its color.
    fn force_spawn(&mut self, peer_id: PeerId) {
        let Some(record) = self.registry.get(peer_id) else {
            return;
        };
        if record.spawned && !record.color_pending {
            return;
        }
        warn!(
            "Peer {}: {}, forcing a respawn",
            peer_id,
            SessionError::Timeout("representation")
        );
        if self.registry.mark_spawned(peer_id).is_err() {
            return;
        }
        self.outbox.broadcast(Broadcast::SpawnPeer {
            peer_id,
            forced: true,
        });
        self.broadcast_color(peer_id);
    }

    fn broadcast_color(&mut self, peer_id: PeerId) {
        if let Some(record) = self.registry.get(peer_id) {
            self.outbox.broadcast(Broadcast::AnnounceColor {
                peer_id,
                color: record.color,
            });
        }
    }

    fn level_loaded(&mut self, from: PeerId, now: Instant) -> Result<(), SessionError> {
        let phase = self.game.phase();
        let record = self
            .registry
            .get_mut(from)
            .ok_or(Rejection::UnknownPeer(from))?;
        if phase != GamePhase::Starting || !record.in_game {
            debug!("Peer {} reported a loaded level during {}", from, phase);
            return Ok(());
        }
        record.level_loaded = true;
        if self.all_levels_loaded() {
            debug!("Every player loaded the level early");
            self.begin_playing(now)?;
        }
        Ok(())
    }

    fn all_levels_loaded(&self) -> bool {
        let mut players = self.registry.records().filter(|record| record.in_game).peekable();
        players.peek().is_some() && players.all(|record| record.level_loaded)
    }

    fn close_voting(&mut self, now: Instant) -> Result<(), SessionError> {
        let outcome = self
            .voting
            .close(&self.game, &mut self.scheduler, &mut self.rng)?;
        self.start_game(outcome, now)
    }

    /// Voting -> Starting with the winning game.
    fn start_game(&mut self, outcome: VoteOutcome, now: Instant) -> Result<(), SessionError> {
        let winner = outcome.winner;
        self.game.transition(GamePhase::Starting)?;
        self.game.set_game_type(winner);
        self.registry.reset_level_loaded();
        self.minigame = Some(get_minigame(winner, &self.config));
        self.scheduler.schedule(
            TimerKind::StartCountdown,
            now,
            self.config.session.start_delay(),
        );

        self.outbox.broadcast(self.game.state_message());
        self.outbox
            .broadcast(Broadcast::LoadGameLevel { game_type: winner });
        let text = if outcome.counts.is_empty() {
            format!("Nobody voted. Playing {winner}!")
        } else if outcome.tied > 1 {
            format!("{winner} won the vote after a tie!")
        } else {
            format!("{winner} won the vote!")
        };
        self.outbox.system_message(text);
        Ok(())
    }

    /// Starting -> Playing.
    fn begin_playing(&mut self, now: Instant) -> Result<(), SessionError> {
        self.scheduler.cancel(TimerKind::StartCountdown);
        self.game.transition(GamePhase::Playing)?;
        self.game.alive = self.registry.in_game_ids().into_iter().collect();
        self.outbox.broadcast(self.game.state_message());

        let started = self.with_minigame(|minigame, ctx| {
            info!(
                "{} round started with {} players",
                minigame.game_type(),
                ctx.game.alive.len()
            );
            let status = minigame.on_start(ctx);
            (status, minigame.time_limit())
        });
        let Some((status, time_limit)) = started else {
            warn!("Entered Playing without a minigame");
            return self.end_game(EndReason::Abandoned, now);
        };

        self.scheduler
            .schedule(TimerKind::GameTimeLimit, now, time_limit);
        if status == MinigameStatus::Finished {
            info!("Nobody to play with, ending the round");
            return self.end_game(EndReason::Abandoned, now);
        }
        Ok(())
    }

    /// Playing -> GameOver.
    fn end_game(&mut self, reason: EndReason, now: Instant) -> Result<(), SessionError> {
        if self.game.phase() != GamePhase::Playing {
            return Err(Rejection::WrongPhase {
                action: "end the game",
                phase: self.game.phase(),
            }
            .into());
        }
        self.scheduler.cancel(TimerKind::GameTimeLimit);
        let summary = self
            .with_minigame(|minigame, ctx| minigame.on_end(ctx, reason))
            .flatten();

        self.game.transition(GamePhase::GameOver)?;
        info!("Round over ({:?})", reason);
        self.outbox.broadcast(self.game.state_message());
        self.restore_colors();
        if let Some(text) = summary {
            self.outbox.system_message(text);
        }
        self.scheduler.schedule(
            TimerKind::ReturnToLobby,
            now,
            self.config.session.game_over_delay(),
        );
        Ok(())
    }

    /// GameOver -> Lobby.
    fn return_to_lobby(&mut self) -> Result<(), SessionError> {
        self.game.transition(GamePhase::Lobby)?;
        self.reset_for_lobby();
        Ok(())
    }

    fn reset_for_lobby(&mut self) {
        self.minigame = None;
        for kind in [
            TimerKind::VotingWindow,
            TimerKind::StartCountdown,
            TimerKind::GameTimeLimit,
            TimerKind::ReturnToLobby,
        ] {
            self.scheduler.cancel(kind);
        }
        self.registry.admit_all();

        self.outbox.broadcast(self.game.state_message());
        self.restore_colors();
        self.outbox.system_message("Back to the lobby.");
    }

    /// Drop the round's color overrides. A no-op once already restored.
    fn restore_colors(&mut self) {
        let colors = self.overrides.restore();
        if !colors.is_empty() {
            self.outbox
                .broadcast(Broadcast::ApplyOriginalColors { colors });
        }
    }

    /// Advance timers and the running minigame.
    pub fn tick(&mut self, now: Instant) {
        for kind in self.scheduler.due(now) {
            debug!("Timer fired: {:?}", kind);
            let result = match kind {
                TimerKind::VotingWindow => self.close_voting(now),
                TimerKind::StartCountdown => self.begin_playing(now),
                TimerKind::GameTimeLimit => self.end_game(EndReason::TimeUp, now),
                TimerKind::ReturnToLobby => self.return_to_lobby(),
                TimerKind::SpawnWait(peer_id) => {
                    self.force_spawn(peer_id);
                    Ok(())
                }
            };
            log_failure(result);
        }

        if self.game.phase() == GamePhase::Playing {
            let status = self.with_minigame(|minigame, ctx| minigame.on_tick(ctx));
            if status == Some(MinigameStatus::Finished) {
                log_failure(self.end_game(EndReason::Ended, now));
            }
        }
    }

    fn with_minigame<T>(
        &mut self,
        f: impl FnOnce(&mut dyn Minigame, &mut GameContext<'_>) -> T,
    ) -> Option<T> {
        let minigame = self.minigame.as_mut()?;
        let mut ctx = GameContext {
            registry: &self.registry,
            game: &mut self.game,
            overrides: &mut self.overrides,
            outbox: &mut self.outbox,
            rng: &mut self.rng,
        };
        Some(f(minigame.as_mut(), &mut ctx))
    }
}

fn log_failure(result: Result<(), SessionError>) {
    if let Err(err) = result {
        warn!("Session step failed: {}", err);
    }
}

fn server_action(request: &Request) -> &'static str {
    match request {
        Request::StartVoting => "start voting",
        Request::EndVotingEarly => "end voting early",
        Request::EndGame => "end the game",
        _ => "do that",
    }
}
