//! Shared protocol crate for the party session layer.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - The closed request/broadcast message catalog
//! - Shared types (PeerId, Color, Position, phases and game types)
//! - The [`Replica`] every peer builds purely from broadcasts

mod binary;
mod error;
mod game;
pub mod packets;
pub mod replica;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;
pub use game::{GamePhase, GameType};
pub use packets::{Authority, Broadcast, Request, TeamInfo};
pub use replica::{Replica, ReplicaEvent};

/// Network endpoint id. Ids are positive; 0 is never assigned.
pub type PeerId = u32;

/// The server is always peer 1.
pub const SERVER_PEER_ID: PeerId = 1;

/// RGB color used for player tinting and chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Color = Color::new(255, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Represents a 2D position using glam's Vec2.
pub type Position = glam::Vec2;
