//! Headless party session client.
//!
//! Connects to a server, keeps a [`protocol::Replica`] in sync and answers
//! the session's handshakes: registration, spawn confirmation, optional
//! voting, level loading and wandering during play.

use std::time::Duration;

use protocol::{Color, GameType};
use thiserror::Error;

pub mod behavior;
pub mod network;

pub use behavior::Behavior;
pub use network::run;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection failed: no answer within {0:?}")]
    Timeout(Duration),
    #[error("invalid color '{0}', expected r,g,b")]
    InvalidColor(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub name: String,
    pub color: Option<Color>,
    /// Game type to vote for whenever voting opens.
    pub vote: Option<GameType>,
    /// Walk around randomly while a round is being played.
    pub wander: bool,
    pub wander_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:24680".into(),
            name: "Player".into(),
            color: None,
            vote: None,
            wander: false,
            wander_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Parse `r,g,b` into a color.
pub fn parse_color(s: &str) -> Result<Color, ClientError> {
    let parts: Vec<u8> = s
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| ClientError::InvalidColor(s.to_string()))?;
    match parts.as_slice() {
        [r, g, b] => Ok(Color::new(*r, *g, *b)),
        _ => Err(ClientError::InvalidColor(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("255, 0,16").unwrap(), Color::new(255, 0, 16));
        assert!(parse_color("255,0").is_err());
        assert!(parse_color("256,0,0").is_err());
        assert!(parse_color("red").is_err());
    }

    #[test]
    fn test_timeout_reads_as_connection_failure() {
        let err = ClientError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().starts_with("connection failed"));
    }
}
