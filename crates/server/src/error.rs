//! Session error types.

use protocol::{GamePhase, PeerId};
use thiserror::Error;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    MissingReplica,
    TransportUnavailable,
    Timeout,
}

/// Why a request was refused. Nothing is mutated when one of these is
/// returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("peer id 0 is not a valid peer")]
    InvalidPeerId,

    #[error("peer {0} is not registered")]
    UnknownPeer(PeerId),

    #[error("peer {0} is already registered")]
    Duplicate(PeerId),

    #[error("name is empty")]
    InvalidName,

    #[error("only the server can {0}")]
    ServerOnly(&'static str),

    #[error("cannot {action} during {phase}")]
    WrongPhase {
        action: &'static str,
        phase: GamePhase,
    },

    #[error("peer {0} joined mid-round and waits for the next lobby")]
    NotInGame(PeerId),

    #[error("that game type cannot be voted for")]
    InvalidGameType,

    #[error("team {0} does not exist")]
    UnknownTeam(u32),

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: GamePhase, to: GamePhase },
}

impl Rejection {
    /// Text unicast back to the sender, if the sender should hear about it.
    pub fn explanation(&self) -> Option<String> {
        match self {
            // The sender is not a real peer or has no record to talk to.
            Rejection::InvalidPeerId | Rejection::UnknownPeer(_) => None,
            Rejection::ServerOnly(action) => Some(format!("Only the server can {action}.")),
            Rejection::WrongPhase { action, phase } => {
                Some(format!("You cannot {action} during {phase}."))
            }
            Rejection::NotInGame(_) => {
                Some("You joined mid-round; you will play from the next lobby.".to_string())
            }
            other => Some(format!("Request refused: {other}.")),
        }
    }
}

/// Errors raised by session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] Rejection),

    #[error("representation of peer {0} does not exist yet")]
    MissingReplica(PeerId),

    #[error("no active network transport")]
    TransportUnavailable,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SessionError::MissingReplica(_) => ErrorKind::MissingReplica,
            SessionError::TransportUnavailable => ErrorKind::TransportUnavailable,
            SessionError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}
