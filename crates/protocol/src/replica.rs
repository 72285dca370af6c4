//! Read-only session replica.
//!
//! Every peer, the server included, keeps one of these and mutates it only
//! by applying [`Broadcast`]s. Collaborators (scene loader, chat box, HUD)
//! subscribe to [`ReplicaEvent`]s instead of polling.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{Broadcast, Color, GamePhase, GameType, PeerId, TeamInfo};

const EVENT_CAPACITY: usize = 256;

/// Replicated view of one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerView {
    pub peer_id: PeerId,
    pub name: String,
    /// Canonical color, never an override.
    pub color: Color,
    pub expression_id: String,
    pub hat_id: String,
    pub character_id: String,
    /// Whether the in-world representation exists locally.
    pub spawned: bool,
}

impl PeerView {
    fn new(peer_id: PeerId, name: String) -> Self {
        Self {
            peer_id,
            name,
            color: Color::default(),
            expression_id: String::new(),
            hat_id: String::new(),
            character_id: String::new(),
            spawned: false,
        }
    }
}

/// Signals published to collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaEvent {
    Welcomed { peer_id: PeerId },
    PeerJoined { peer_id: PeerId, name: String },
    PeerRenamed { peer_id: PeerId, name: String },
    PeerLeft { peer_id: PeerId },
    /// A visible color was (re)applied to a spawned representation.
    ColorApplied { peer_id: PeerId, color: Color },
    Spawned { peer_id: PeerId, forced: bool },
    TeamChanged { team_id: u32 },
    PhaseChanged { phase: GamePhase, game_type: GameType },
    VotingStarted { window_secs: u32 },
    VoteCast { peer_id: PeerId, game_type: GameType },
    LoadLevel { game_type: GameType },
    TaggerChanged { tagger: PeerId },
    SystemMessage { text: String },
}

/// A peer's local copy of the session.
#[derive(Debug)]
pub struct Replica {
    local_id: Option<PeerId>,
    peers: BTreeMap<PeerId, PeerView>,
    /// Colors announced before the matching name arrived.
    early_colors: BTreeMap<PeerId, Color>,
    teams: BTreeMap<u32, TeamInfo>,
    phase: GamePhase,
    game_type: GameType,
    votes: BTreeMap<PeerId, GameType>,
    tagger: Option<PeerId>,
    overrides: BTreeMap<PeerId, Color>,
    events: broadcast::Sender<ReplicaEvent>,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl Replica {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            local_id: None,
            peers: BTreeMap::new(),
            early_colors: BTreeMap::new(),
            teams: BTreeMap::new(),
            phase: GamePhase::Lobby,
            game_type: GameType::None,
            votes: BTreeMap::new(),
            tagger: None,
            overrides: BTreeMap::new(),
            events,
        }
    }

    /// Subscribe to replica events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReplicaEvent> {
        self.events.subscribe()
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.local_id
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    pub fn tagger(&self) -> Option<PeerId> {
        self.tagger
    }

    pub fn peer(&self, peer_id: PeerId) -> Option<&PeerView> {
        self.peers.get(&peer_id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerView> {
        self.peers.values()
    }

    pub fn team(&self, team_id: u32) -> Option<&TeamInfo> {
        self.teams.get(&team_id)
    }

    pub fn votes(&self) -> &BTreeMap<PeerId, GameType> {
        &self.votes
    }

    /// Live vote counts per game type.
    pub fn tally(&self) -> BTreeMap<GameType, usize> {
        let mut counts = BTreeMap::new();
        for game_type in self.votes.values() {
            *counts.entry(*game_type).or_insert(0) += 1;
        }
        counts
    }

    /// The color a peer is currently shown with: an override if one is
    /// active, the canonical color otherwise.
    pub fn displayed_color(&self, peer_id: PeerId) -> Option<Color> {
        let peer = self.peers.get(&peer_id)?;
        Some(self.overrides.get(&peer_id).copied().unwrap_or(peer.color))
    }

    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    fn publish(&self, event: ReplicaEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn show_color(&self, peer_id: PeerId) {
        if let Some(peer) = self.peers.get(&peer_id) {
            if peer.spawned {
                let color = self.overrides.get(&peer_id).copied().unwrap_or(peer.color);
                self.publish(ReplicaEvent::ColorApplied { peer_id, color });
            }
        }
    }

    fn set_overrides(&mut self, colors: &[(PeerId, Color)]) {
        for &(peer_id, color) in colors {
            if self.peers.contains_key(&peer_id) {
                self.overrides.insert(peer_id, color);
                self.show_color(peer_id);
            } else {
                debug!("Override for unknown peer {} ignored", peer_id);
            }
        }
    }

    /// Apply one broadcast. Returns whether anything observable changed.
    pub fn apply(&mut self, message: &Broadcast) -> bool {
        match message {
            Broadcast::Welcome { peer_id } => {
                if self.local_id == Some(*peer_id) {
                    return false;
                }
                self.local_id = Some(*peer_id);
                self.publish(ReplicaEvent::Welcomed { peer_id: *peer_id });
            }

            Broadcast::AnnounceName {
                peer_id,
                name,
                is_rename,
            } => match self.peers.get_mut(peer_id) {
                Some(peer) => {
                    if peer.name == *name {
                        return false;
                    }
                    peer.name = name.clone();
                    if !is_rename {
                        debug!("Peer {} re-announced under a new name", peer_id);
                    }
                    self.publish(ReplicaEvent::PeerRenamed {
                        peer_id: *peer_id,
                        name: name.clone(),
                    });
                }
                None => {
                    let mut peer = PeerView::new(*peer_id, name.clone());
                    if let Some(color) = self.early_colors.remove(peer_id) {
                        peer.color = color;
                    }
                    self.peers.insert(*peer_id, peer);
                    self.publish(ReplicaEvent::PeerJoined {
                        peer_id: *peer_id,
                        name: name.clone(),
                    });
                }
            },

            Broadcast::AnnounceColor { peer_id, color } => match self.peers.get_mut(peer_id) {
                Some(peer) => {
                    if peer.color == *color {
                        return false;
                    }
                    peer.color = *color;
                    // Without a representation the color waits for SpawnPeer.
                    self.show_color(*peer_id);
                }
                None => {
                    debug!("Color for peer {} arrived before its record", peer_id);
                    self.early_colors.insert(*peer_id, *color);
                }
            },

            Broadcast::AnnounceCosmetics {
                peer_id,
                expression_id,
                hat_id,
                character_id,
            } => {
                let Some(peer) = self.peers.get_mut(peer_id) else {
                    warn!("Cosmetics for unknown peer {}", peer_id);
                    return false;
                };
                peer.expression_id = expression_id.clone();
                peer.hat_id = hat_id.clone();
                peer.character_id = character_id.clone();
            }

            Broadcast::AnnouncePeerLeft { peer_id } => {
                self.early_colors.remove(peer_id);
                if self.peers.remove(peer_id).is_none() {
                    return false;
                }
                self.votes.remove(peer_id);
                self.overrides.remove(peer_id);
                for team in self.teams.values_mut() {
                    team.members.retain(|id| id != peer_id);
                }
                self.publish(ReplicaEvent::PeerLeft { peer_id: *peer_id });
            }

            Broadcast::SpawnPeer { peer_id, forced } => {
                let Some(peer) = self.peers.get_mut(peer_id) else {
                    warn!("Spawn for unknown peer {}", peer_id);
                    return false;
                };
                if peer.spawned && !forced {
                    return false;
                }
                peer.spawned = true;
                self.publish(ReplicaEvent::Spawned {
                    peer_id: *peer_id,
                    forced: *forced,
                });
                // Deferred visuals land now that the representation exists.
                self.show_color(*peer_id);
            }

            Broadcast::AnnounceTeam { team } => {
                if self.teams.get(&team.team_id) == Some(team) {
                    return false;
                }
                self.teams.insert(team.team_id, team.clone());
                self.publish(ReplicaEvent::TeamChanged {
                    team_id: team.team_id,
                });
            }

            Broadcast::VotingStarted { window_secs } => {
                self.votes.clear();
                self.publish(ReplicaEvent::VotingStarted {
                    window_secs: *window_secs,
                });
            }

            Broadcast::BroadcastVote {
                peer_id, game_type, ..
            } => {
                if self.votes.insert(*peer_id, *game_type) == Some(*game_type) {
                    return false;
                }
                self.publish(ReplicaEvent::VoteCast {
                    peer_id: *peer_id,
                    game_type: *game_type,
                });
            }

            Broadcast::LoadGameLevel { game_type } => {
                self.publish(ReplicaEvent::LoadLevel {
                    game_type: *game_type,
                });
            }

            Broadcast::AnnounceTagger { tagger, colors } => {
                self.tagger = Some(*tagger);
                self.set_overrides(colors);
                self.publish(ReplicaEvent::TaggerChanged { tagger: *tagger });
            }

            Broadcast::AnnounceTagChange { tagger, colors, .. } => {
                self.set_overrides(colors);
                if self.tagger == Some(*tagger) {
                    return false;
                }
                self.tagger = Some(*tagger);
                self.publish(ReplicaEvent::TaggerChanged { tagger: *tagger });
            }

            Broadcast::ApplyColorOverrides { colors } => self.set_overrides(colors),

            Broadcast::ApplyOriginalColors { colors } => {
                self.overrides.clear();
                for &(peer_id, color) in colors {
                    if let Some(peer) = self.peers.get_mut(&peer_id) {
                        peer.color = color;
                        self.show_color(peer_id);
                    }
                }
            }

            Broadcast::SystemMessage { text } => {
                self.publish(ReplicaEvent::SystemMessage { text: text.clone() });
            }

            Broadcast::UpdateClientGameState { phase, game_type } => {
                if self.phase == *phase && self.game_type == *game_type {
                    return false;
                }
                self.phase = *phase;
                self.game_type = *game_type;
                if *phase != GamePhase::Playing {
                    self.tagger = None;
                }
                if *phase == GamePhase::Lobby {
                    self.votes.clear();
                }
                self.publish(ReplicaEvent::PhaseChanged {
                    phase: *phase,
                    game_type: *game_type,
                });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(replica: &mut Replica, peer_id: PeerId, name: &str) {
        replica.apply(&Broadcast::AnnounceName {
            peer_id,
            name: name.into(),
            is_rename: false,
        });
    }

    #[test]
    fn test_phase_reapply_is_noop() {
        let mut replica = Replica::new();
        let mut events = replica.subscribe();
        let msg = Broadcast::UpdateClientGameState {
            phase: GamePhase::Voting,
            game_type: GameType::None,
        };

        assert!(replica.apply(&msg));
        assert!(!replica.apply(&msg));

        assert_eq!(
            events.try_recv().unwrap(),
            ReplicaEvent::PhaseChanged {
                phase: GamePhase::Voting,
                game_type: GameType::None
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_color_deferred_until_spawn() {
        let mut replica = Replica::new();
        joined(&mut replica, 2, "Ada");
        let mut events = replica.subscribe();

        replica.apply(&Broadcast::AnnounceColor {
            peer_id: 2,
            color: Color::new(1, 2, 3),
        });
        assert!(events.try_recv().is_err());
        assert_eq!(replica.peer(2).unwrap().color, Color::new(1, 2, 3));

        replica.apply(&Broadcast::SpawnPeer {
            peer_id: 2,
            forced: false,
        });
        assert_eq!(
            events.try_recv().unwrap(),
            ReplicaEvent::Spawned {
                peer_id: 2,
                forced: false
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            ReplicaEvent::ColorApplied {
                peer_id: 2,
                color: Color::new(1, 2, 3)
            }
        );
    }

    #[test]
    fn test_color_before_name_is_kept() {
        let mut replica = Replica::new();
        replica.apply(&Broadcast::AnnounceColor {
            peer_id: 4,
            color: Color::new(9, 9, 9),
        });
        joined(&mut replica, 4, "Late");
        assert_eq!(replica.peer(4).unwrap().color, Color::new(9, 9, 9));
    }

    #[test]
    fn test_overrides_do_not_touch_canonical_color() {
        let mut replica = Replica::new();
        joined(&mut replica, 2, "Ada");
        replica.apply(&Broadcast::AnnounceColor {
            peer_id: 2,
            color: Color::new(0, 200, 0),
        });
        replica.apply(&Broadcast::AnnounceTagger {
            tagger: 2,
            colors: vec![(2, Color::RED)],
        });

        assert_eq!(replica.displayed_color(2), Some(Color::RED));
        assert_eq!(replica.peer(2).unwrap().color, Color::new(0, 200, 0));
        assert_eq!(replica.tagger(), Some(2));

        replica.apply(&Broadcast::ApplyOriginalColors {
            colors: vec![(2, Color::new(0, 200, 0))],
        });
        assert_eq!(replica.displayed_color(2), Some(Color::new(0, 200, 0)));
        assert!(!replica.has_overrides());
    }

    #[test]
    fn test_peer_left_drops_vote_and_team_membership() {
        let mut replica = Replica::new();
        joined(&mut replica, 2, "Ada");
        replica.apply(&Broadcast::AnnounceTeam {
            team: TeamInfo {
                team_id: 0,
                name: "Red".into(),
                color: Color::RED,
                members: vec![2],
            },
        });
        replica.apply(&Broadcast::BroadcastVote {
            peer_id: 2,
            game_type: GameType::Race,
            name: "Ada".into(),
            color: Color::WHITE,
        });
        assert_eq!(replica.tally().get(&GameType::Race), Some(&1));

        assert!(replica.apply(&Broadcast::AnnouncePeerLeft { peer_id: 2 }));
        assert!(replica.votes().is_empty());
        assert!(replica.team(0).unwrap().members.is_empty());
        assert!(!replica.apply(&Broadcast::AnnouncePeerLeft { peer_id: 2 }));
    }

    #[test]
    fn test_vote_overwrite_counts_once() {
        let mut replica = Replica::new();
        for game_type in [GameType::Tag, GameType::Race] {
            replica.apply(&Broadcast::BroadcastVote {
                peer_id: 3,
                game_type,
                name: "Bo".into(),
                color: Color::WHITE,
            });
        }
        let tally = replica.tally();
        assert_eq!(tally.get(&GameType::Race), Some(&1));
        assert_eq!(tally.get(&GameType::Tag), None);
    }
}
