//! Server -> peer broadcasts.

use bytes::Bytes;

use super::{get_color_list, put_color_list, BroadcastOpcode, TeamInfo};
use crate::{BinaryReader, BinaryWriter, Color, GamePhase, GameType, PeerId, ProtocolError};

/// An authoritative message from the server.
///
/// Every variant is a full-value overwrite so that delivery order across
/// different peers does not matter.
#[derive(Debug, Clone, PartialEq)]
pub enum Broadcast {
    /// Tells a freshly connected peer its own id (0x80, unicast).
    Welcome { peer_id: PeerId },
    /// Name of a peer (0x81).
    AnnounceName {
        peer_id: PeerId,
        name: String,
        is_rename: bool,
    },
    /// Canonical color of a peer (0x82).
    AnnounceColor { peer_id: PeerId, color: Color },
    /// Cosmetic catalog keys of a peer (0x83).
    AnnounceCosmetics {
        peer_id: PeerId,
        expression_id: String,
        hat_id: String,
        character_id: String,
    },
    /// A peer disconnected (0x84).
    AnnouncePeerLeft { peer_id: PeerId },
    /// A peer's representation exists; `forced` marks a respawn after the
    /// spawn wait timed out (0x85).
    SpawnPeer { peer_id: PeerId, forced: bool },
    /// Full snapshot of one team (0x86).
    AnnounceTeam { team: TeamInfo },
    /// Voting window opened (0x90).
    VotingStarted { window_secs: u32 },
    /// An accepted vote (0x91).
    BroadcastVote {
        peer_id: PeerId,
        game_type: GameType,
        name: String,
        color: Color,
    },
    /// Which level the scene collaborator should load (0x92).
    LoadGameLevel { game_type: GameType },
    /// Initial tagger and override colors (0xA0).
    AnnounceTagger {
        tagger: PeerId,
        colors: Vec<(PeerId, Color)>,
    },
    /// Tagger handover (0xA1).
    AnnounceTagChange {
        previous: PeerId,
        tagger: PeerId,
        colors: Vec<(PeerId, Color)>,
    },
    /// Temporary per-game colors (0xA2).
    ApplyColorOverrides { colors: Vec<(PeerId, Color)> },
    /// Restore pre-game colors and drop overrides (0xA3).
    ApplyOriginalColors { colors: Vec<(PeerId, Color)> },
    /// Server-authored chat line (0xB0).
    SystemMessage { text: String },
    /// Authoritative phase (0xB1).
    UpdateClientGameState { phase: GamePhase, game_type: GameType },
}

impl Broadcast {
    pub fn opcode(&self) -> BroadcastOpcode {
        match self {
            Broadcast::Welcome { .. } => BroadcastOpcode::Welcome,
            Broadcast::AnnounceName { .. } => BroadcastOpcode::AnnounceName,
            Broadcast::AnnounceColor { .. } => BroadcastOpcode::AnnounceColor,
            Broadcast::AnnounceCosmetics { .. } => BroadcastOpcode::AnnounceCosmetics,
            Broadcast::AnnouncePeerLeft { .. } => BroadcastOpcode::AnnouncePeerLeft,
            Broadcast::SpawnPeer { .. } => BroadcastOpcode::SpawnPeer,
            Broadcast::AnnounceTeam { .. } => BroadcastOpcode::AnnounceTeam,
            Broadcast::VotingStarted { .. } => BroadcastOpcode::VotingStarted,
            Broadcast::BroadcastVote { .. } => BroadcastOpcode::BroadcastVote,
            Broadcast::LoadGameLevel { .. } => BroadcastOpcode::LoadGameLevel,
            Broadcast::AnnounceTagger { .. } => BroadcastOpcode::AnnounceTagger,
            Broadcast::AnnounceTagChange { .. } => BroadcastOpcode::AnnounceTagChange,
            Broadcast::ApplyColorOverrides { .. } => BroadcastOpcode::ApplyColorOverrides,
            Broadcast::ApplyOriginalColors { .. } => BroadcastOpcode::ApplyOriginalColors,
            Broadcast::SystemMessage { .. } => BroadcastOpcode::SystemMessage,
            Broadcast::UpdateClientGameState { .. } => BroadcastOpcode::UpdateClientGameState,
        }
    }

    /// Encode into a single frame.
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::new();
        w.put_u8(self.opcode() as u8);
        match self {
            Broadcast::Welcome { peer_id }
            | Broadcast::AnnouncePeerLeft { peer_id } => w.put_u32(*peer_id),
            Broadcast::AnnounceName {
                peer_id,
                name,
                is_rename,
            } => {
                w.put_u32(*peer_id);
                w.put_string_utf8(name);
                w.put_bool(*is_rename);
            }
            Broadcast::AnnounceColor { peer_id, color } => {
                w.put_u32(*peer_id);
                w.put_color(*color);
            }
            Broadcast::AnnounceCosmetics {
                peer_id,
                expression_id,
                hat_id,
                character_id,
            } => {
                w.put_u32(*peer_id);
                w.put_string_utf8(expression_id);
                w.put_string_utf8(hat_id);
                w.put_string_utf8(character_id);
            }
            Broadcast::SpawnPeer { peer_id, forced } => {
                w.put_u32(*peer_id);
                w.put_bool(*forced);
            }
            Broadcast::AnnounceTeam { team } => team.write(&mut w),
            Broadcast::VotingStarted { window_secs } => w.put_u32(*window_secs),
            Broadcast::BroadcastVote {
                peer_id,
                game_type,
                name,
                color,
            } => {
                w.put_u32(*peer_id);
                w.put_u8(*game_type as u8);
                w.put_string_utf8(name);
                w.put_color(*color);
            }
            Broadcast::LoadGameLevel { game_type } => w.put_u8(*game_type as u8),
            Broadcast::AnnounceTagger { tagger, colors } => {
                w.put_u32(*tagger);
                put_color_list(&mut w, colors);
            }
            Broadcast::AnnounceTagChange {
                previous,
                tagger,
                colors,
            } => {
                w.put_u32(*previous);
                w.put_u32(*tagger);
                put_color_list(&mut w, colors);
            }
            Broadcast::ApplyColorOverrides { colors }
            | Broadcast::ApplyOriginalColors { colors } => put_color_list(&mut w, colors),
            Broadcast::SystemMessage { text } => w.put_string_utf8(text),
            Broadcast::UpdateClientGameState { phase, game_type } => {
                w.put_u8(*phase as u8);
                w.put_u8(*game_type as u8);
            }
        }
        w.finish()
    }

    /// Parse a broadcast from one frame.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let mut r = BinaryReader::new(data.to_vec());
        let opcode = r.get_u8()?;

        let broadcast = match opcode {
            0x80 => Broadcast::Welcome {
                peer_id: r.get_u32()?,
            },
            0x81 => Broadcast::AnnounceName {
                peer_id: r.get_u32()?,
                name: r.get_string_utf8()?,
                is_rename: r.get_bool()?,
            },
            0x82 => Broadcast::AnnounceColor {
                peer_id: r.get_u32()?,
                color: r.get_color()?,
            },
            0x83 => Broadcast::AnnounceCosmetics {
                peer_id: r.get_u32()?,
                expression_id: r.get_string_utf8()?,
                hat_id: r.get_string_utf8()?,
                character_id: r.get_string_utf8()?,
            },
            0x84 => Broadcast::AnnouncePeerLeft {
                peer_id: r.get_u32()?,
            },
            0x85 => Broadcast::SpawnPeer {
                peer_id: r.get_u32()?,
                forced: r.get_bool()?,
            },
            0x86 => Broadcast::AnnounceTeam {
                team: TeamInfo::read(&mut r)?,
            },
            0x90 => Broadcast::VotingStarted {
                window_secs: r.get_u32()?,
            },
            0x91 => Broadcast::BroadcastVote {
                peer_id: r.get_u32()?,
                game_type: GameType::try_from(r.get_u8()?)?,
                name: r.get_string_utf8()?,
                color: r.get_color()?,
            },
            0x92 => Broadcast::LoadGameLevel {
                game_type: GameType::try_from(r.get_u8()?)?,
            },
            0xA0 => Broadcast::AnnounceTagger {
                tagger: r.get_u32()?,
                colors: get_color_list(&mut r)?,
            },
            0xA1 => Broadcast::AnnounceTagChange {
                previous: r.get_u32()?,
                tagger: r.get_u32()?,
                colors: get_color_list(&mut r)?,
            },
            0xA2 => Broadcast::ApplyColorOverrides {
                colors: get_color_list(&mut r)?,
            },
            0xA3 => Broadcast::ApplyOriginalColors {
                colors: get_color_list(&mut r)?,
            },
            0xB0 => Broadcast::SystemMessage {
                text: r.get_string_utf8()?,
            },
            0xB1 => Broadcast::UpdateClientGameState {
                phase: GamePhase::try_from(r.get_u8()?)?,
                game_type: GameType::try_from(r.get_u8()?)?,
            },
            _ => return Err(ProtocolError::UnknownOpcode(opcode)),
        };

        r.finish()?;
        Ok(broadcast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_change_frame() {
        let msg = Broadcast::AnnounceTagChange {
            previous: 2,
            tagger: 3,
            colors: vec![(2, Color::WHITE), (3, Color::RED)],
        };
        let frame = msg.encode();
        assert_eq!(frame[0], 0xA1);
        // opcode + 2 ids + count + 2 * (id + rgb)
        assert_eq!(frame.len(), 1 + 8 + 2 + 2 * 7);
        assert_eq!(Broadcast::parse(&frame).unwrap(), msg);
    }

    #[test]
    fn test_team_snapshot_frame() {
        let msg = Broadcast::AnnounceTeam {
            team: TeamInfo {
                team_id: 1,
                name: "Blue".into(),
                color: Color::new(0, 0, 255),
                members: vec![2, 5],
            },
        };
        assert_eq!(Broadcast::parse(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_phase_frame_rejects_unknown_phase() {
        assert_eq!(
            Broadcast::parse(&[0xB1, 7, 1]),
            Err(ProtocolError::InvalidValue {
                field: "phase",
                value: 7
            })
        );
    }

    #[test]
    fn test_request_opcodes_are_not_broadcasts() {
        assert_eq!(Broadcast::parse(&[0x01]), Err(ProtocolError::UnknownOpcode(0x01)));
    }
}
