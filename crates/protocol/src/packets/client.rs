//! Peer -> server requests.

use bytes::Bytes;

use super::{Authority, RequestOpcode};
use crate::{BinaryReader, BinaryWriter, GameType, Position, ProtocolError};

/// A request sent by a peer to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Create or rename the sender's record (0x01).
    RegisterName { name: String, is_rename: bool },
    /// Change the sender's color (0x02).
    RegisterColor { color: crate::Color },
    /// Change the sender's cosmetic ids (0x03).
    RegisterCosmetics {
        expression_id: String,
        hat_id: String,
        character_id: String,
    },
    /// The sender's in-world representation now exists (0x04).
    SpawnReady,
    /// The sender's current position (0x05).
    UpdatePosition { position: Position },
    /// Move the sender into a team (0x06).
    JoinTeam { team_id: u32 },
    /// Remove the sender from its team (0x07).
    LeaveTeam,
    /// The sender finished loading the announced level (0x08).
    LevelLoaded,
    /// Open the voting window (0x10, server only).
    StartVoting,
    /// Vote for a minigame (0x11).
    CastVote { game_type: GameType },
    /// Close the voting window now (0x12, server only).
    EndVotingEarly,
    /// End the running minigame (0x13, server only).
    EndGame,
}

impl Request {
    /// Who may issue this request.
    pub fn authority(&self) -> Authority {
        match self {
            Request::StartVoting | Request::EndVotingEarly | Request::EndGame => {
                Authority::ServerOnly
            }
            _ => Authority::AnyPeer,
        }
    }

    pub fn opcode(&self) -> RequestOpcode {
        match self {
            Request::RegisterName { .. } => RequestOpcode::RegisterName,
            Request::RegisterColor { .. } => RequestOpcode::RegisterColor,
            Request::RegisterCosmetics { .. } => RequestOpcode::RegisterCosmetics,
            Request::SpawnReady => RequestOpcode::SpawnReady,
            Request::UpdatePosition { .. } => RequestOpcode::UpdatePosition,
            Request::JoinTeam { .. } => RequestOpcode::JoinTeam,
            Request::LeaveTeam => RequestOpcode::LeaveTeam,
            Request::LevelLoaded => RequestOpcode::LevelLoaded,
            Request::StartVoting => RequestOpcode::StartVoting,
            Request::CastVote { .. } => RequestOpcode::CastVote,
            Request::EndVotingEarly => RequestOpcode::EndVotingEarly,
            Request::EndGame => RequestOpcode::EndGame,
        }
    }

    /// Encode into a single frame.
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::new();
        w.put_u8(self.opcode() as u8);
        match self {
            Request::RegisterName { name, is_rename } => {
                w.put_string_utf8(name);
                w.put_bool(*is_rename);
            }
            Request::RegisterColor { color } => w.put_color(*color),
            Request::RegisterCosmetics {
                expression_id,
                hat_id,
                character_id,
            } => {
                w.put_string_utf8(expression_id);
                w.put_string_utf8(hat_id);
                w.put_string_utf8(character_id);
            }
            Request::UpdatePosition { position } => w.put_position(*position),
            Request::JoinTeam { team_id } => w.put_u32(*team_id),
            Request::CastVote { game_type } => w.put_u8(*game_type as u8),
            Request::SpawnReady
            | Request::LeaveTeam
            | Request::LevelLoaded
            | Request::StartVoting
            | Request::EndVotingEarly
            | Request::EndGame => {}
        }
        w.finish()
    }

    /// Parse a request from one frame.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.get_u8()?;

        let request = match opcode {
            0x01 => {
                let name = reader.get_string_utf8()?;
                let is_rename = reader.get_bool()?;
                Request::RegisterName { name, is_rename }
            }
            0x02 => Request::RegisterColor {
                color: reader.get_color()?,
            },
            0x03 => Request::RegisterCosmetics {
                expression_id: reader.get_string_utf8()?,
                hat_id: reader.get_string_utf8()?,
                character_id: reader.get_string_utf8()?,
            },
            0x04 => Request::SpawnReady,
            0x05 => Request::UpdatePosition {
                position: reader.get_position()?,
            },
            0x06 => Request::JoinTeam {
                team_id: reader.get_u32()?,
            },
            0x07 => Request::LeaveTeam,
            0x08 => Request::LevelLoaded,
            0x10 => Request::StartVoting,
            0x11 => Request::CastVote {
                game_type: GameType::try_from(reader.get_u8()?)?,
            },
            0x12 => Request::EndVotingEarly,
            0x13 => Request::EndGame,
            _ => return Err(ProtocolError::UnknownOpcode(opcode)),
        };

        reader.finish()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_name_frame_layout() {
        let frame = Request::RegisterName {
            name: "Ada".into(),
            is_rename: true,
        }
        .encode();
        assert_eq!(&frame[..], &[0x01, b'A', b'd', b'a', 0, 1]);
        assert_eq!(
            Request::parse(&frame).unwrap(),
            Request::RegisterName {
                name: "Ada".into(),
                is_rename: true
            }
        );
    }

    #[test]
    fn test_authority_catalog() {
        assert_eq!(Request::StartVoting.authority(), Authority::ServerOnly);
        assert_eq!(Request::EndVotingEarly.authority(), Authority::ServerOnly);
        assert_eq!(Request::EndGame.authority(), Authority::ServerOnly);
        assert_eq!(
            Request::CastVote {
                game_type: GameType::Tag
            }
            .authority(),
            Authority::AnyPeer
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Request::parse(&[]), Err(ProtocolError::EmptyFrame));
        assert_eq!(Request::parse(&[0x7F]), Err(ProtocolError::UnknownOpcode(0x7F)));
        assert_eq!(
            Request::parse(&[0x11, 42]),
            Err(ProtocolError::InvalidValue {
                field: "game_type",
                value: 42
            })
        );
        assert_eq!(Request::parse(&[0x04, 0]), Err(ProtocolError::TrailingBytes(1)));
        assert_eq!(Request::parse(&[0x06, 1, 0]), Err(ProtocolError::UnexpectedEof));
    }

    #[test]
    fn test_position_request() {
        let req = Request::UpdatePosition {
            position: Position::new(12.5, -3.0),
        };
        assert_eq!(Request::parse(&req.encode()).unwrap(), req);
    }
}
