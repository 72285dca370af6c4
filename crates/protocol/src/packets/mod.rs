//! Message catalog for the session protocol.
//!
//! Two shapes exist. A [`Request`] may be sent by any peer but only the
//! server acts on it. A [`Broadcast`] is the server's authoritative result,
//! applied unconditionally by every receiver, the server's own replica
//! included. Each frame is one opcode byte followed by the payload.

mod client;
mod server;

pub use client::*;
pub use server::*;

use tracing::warn;

use crate::{BinaryReader, BinaryWriter, Color, PeerId, ProtocolError};

/// Longest list a frame can carry; lists use a `u16` count.
pub const MAX_LIST_LEN: usize = u16::MAX as usize;

/// Clamp a list length to what fits the `u16` count prefix.
fn list_len(what: &str, len: usize) -> u16 {
    match u16::try_from(len) {
        Ok(count) => count,
        Err(_) => {
            warn!("Truncating {} list of {} entries to {}", what, len, MAX_LIST_LEN);
            u16::MAX
        }
    }
}

/// Opcodes for peer -> server requests.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOpcode {
    RegisterName = 0x01,
    RegisterColor = 0x02,
    RegisterCosmetics = 0x03,
    SpawnReady = 0x04,
    UpdatePosition = 0x05,
    JoinTeam = 0x06,
    LeaveTeam = 0x07,
    LevelLoaded = 0x08,
    StartVoting = 0x10,
    CastVote = 0x11,
    EndVotingEarly = 0x12,
    EndGame = 0x13,
}

/// Opcodes for server -> peer broadcasts.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOpcode {
    Welcome = 0x80,
    AnnounceName = 0x81,
    AnnounceColor = 0x82,
    AnnounceCosmetics = 0x83,
    AnnouncePeerLeft = 0x84,
    SpawnPeer = 0x85,
    AnnounceTeam = 0x86,
    VotingStarted = 0x90,
    BroadcastVote = 0x91,
    LoadGameLevel = 0x92,
    AnnounceTagger = 0xA0,
    AnnounceTagChange = 0xA1,
    ApplyColorOverrides = 0xA2,
    ApplyOriginalColors = 0xA3,
    SystemMessage = 0xB0,
    UpdateClientGameState = 0xB1,
}

/// Who may send a request and still have it acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Any peer may send it; the server validates and decides.
    AnyPeer,
    /// Only the server's own local player may issue it.
    ServerOnly,
}

/// Full-value snapshot of one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInfo {
    pub team_id: u32,
    pub name: String,
    pub color: Color,
    /// Members in ascending peer id order.
    pub members: Vec<PeerId>,
}

impl TeamInfo {
    fn write(&self, w: &mut BinaryWriter) {
        w.put_u32(self.team_id);
        w.put_string_utf8(&self.name);
        w.put_color(self.color);
        let count = list_len("team member", self.members.len());
        w.put_u16(count);
        for &id in self.members.iter().take(count as usize) {
            w.put_u32(id);
        }
    }

    fn read(r: &mut BinaryReader) -> Result<Self, ProtocolError> {
        let team_id = r.get_u32()?;
        let name = r.get_string_utf8()?;
        let color = r.get_color()?;
        let count = r.get_u16()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            members.push(r.get_u32()?);
        }
        Ok(Self {
            team_id,
            name,
            color,
            members,
        })
    }
}

/// Write a list of per-peer colors.
pub(crate) fn put_color_list(w: &mut BinaryWriter, colors: &[(PeerId, Color)]) {
    let count = list_len("color", colors.len());
    w.put_u16(count);
    for &(id, color) in colors.iter().take(count as usize) {
        w.put_u32(id);
        w.put_color(color);
    }
}

pub(crate) fn get_color_list(r: &mut BinaryReader) -> Result<Vec<(PeerId, Color)>, ProtocolError> {
    let count = r.get_u16()?;
    let mut colors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.get_u32()?;
        colors.push((id, r.get_color()?));
    }
    Ok(colors)
}
