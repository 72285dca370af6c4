//! Session phases and minigame types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The five phases of a session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GamePhase {
    #[default]
    Lobby = 0,
    Voting = 1,
    Starting = 2,
    Playing = 3,
    GameOver = 4,
}

impl TryFrom<u8> for GamePhase {
    type Error = ProtocolError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => GamePhase::Lobby,
            1 => GamePhase::Voting,
            2 => GamePhase::Starting,
            3 => GamePhase::Playing,
            4 => GamePhase::GameOver,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "phase",
                    value: val as u32,
                })
            }
        })
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::Lobby => "lobby",
            GamePhase::Voting => "voting",
            GamePhase::Starting => "starting",
            GamePhase::Playing => "playing",
            GamePhase::GameOver => "game over",
        };
        f.write_str(name)
    }
}

/// Minigame selected by the vote.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    #[default]
    None = 0,
    Tag = 1,
    HideAndSeek = 2,
    MurderMystery = 3,
    Climbing = 4,
    Race = 5,
}

impl GameType {
    /// Every type a player can vote for.
    pub const VOTABLE: [GameType; 5] = [
        GameType::Tag,
        GameType::HideAndSeek,
        GameType::MurderMystery,
        GameType::Climbing,
        GameType::Race,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            GameType::None => "None",
            GameType::Tag => "Tag",
            GameType::HideAndSeek => "Hide and Seek",
            GameType::MurderMystery => "Murder Mystery",
            GameType::Climbing => "Climbing",
            GameType::Race => "Race",
        }
    }
}

impl TryFrom<u8> for GameType {
    type Error = ProtocolError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Ok(match val {
            0 => GameType::None,
            1 => GameType::Tag,
            2 => GameType::HideAndSeek,
            3 => GameType::MurderMystery,
            4 => GameType::Climbing,
            5 => GameType::Race,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "game_type",
                    value: val as u32,
                })
            }
        })
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "tag" => Ok(GameType::Tag),
            "hide_and_seek" => Ok(GameType::HideAndSeek),
            "murder_mystery" => Ok(GameType::MurderMystery),
            "climbing" => Ok(GameType::Climbing),
            "race" => Ok(GameType::Race),
            other => Err(format!("unknown game type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_u8() {
        assert_eq!(GamePhase::try_from(3).unwrap(), GamePhase::Playing);
        assert!(GamePhase::try_from(9).is_err());
    }

    #[test]
    fn test_game_type_parse() {
        assert_eq!("Hide-and-Seek".parse::<GameType>().unwrap(), GameType::HideAndSeek);
        assert_eq!("race".parse::<GameType>().unwrap(), GameType::Race);
        assert!("none".parse::<GameType>().is_err());
    }
}
