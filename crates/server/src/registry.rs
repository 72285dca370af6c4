//! Authoritative peer records.

use std::collections::BTreeMap;

use protocol::{Color, PeerId, Position};
use tracing::warn;

use crate::error::{Rejection, SessionError};

/// Everything the server knows about one registered peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub name: String,
    /// Canonical color. Game overrides never write here.
    pub color: Color,
    pub expression_id: String,
    pub hat_id: String,
    pub character_id: String,
    /// False for peers that joined mid-round, until the next lobby.
    pub in_game: bool,
    /// The peer confirmed its in-world representation exists.
    pub spawned: bool,
    /// A color update is waiting for the representation.
    pub color_pending: bool,
    pub position: Option<Position>,
    pub level_loaded: bool,
}

impl PeerRecord {
    fn new(peer_id: PeerId, name: String, in_game: bool) -> Self {
        Self {
            peer_id,
            name,
            color: Color::WHITE,
            expression_id: String::new(),
            hat_id: String::new(),
            character_id: String::new(),
            in_game,
            spawned: false,
            color_pending: false,
            position: None,
            level_loaded: false,
        }
    }
}

/// Result of an accepted registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Joined,
    Renamed { previous: String },
}

/// Registered peers, ordered by id.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: BTreeMap<PeerId, PeerRecord>,
    max_name_length: usize,
}

impl PeerRegistry {
    pub fn new(max_name_length: usize) -> Self {
        Self {
            peers: BTreeMap::new(),
            max_name_length,
        }
    }

    /// Trim and truncate a requested name.
    pub fn sanitize_name(&self, raw: &str) -> Result<String, Rejection> {
        let name: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_control())
            .take(self.max_name_length)
            .collect();
        let name = name.trim_end().to_string();
        if name.is_empty() {
            return Err(Rejection::InvalidName);
        }
        Ok(name)
    }

    /// Create or rename a record.
    ///
    /// A rename for a peer without a record is treated as its join.
    pub fn register(
        &mut self,
        peer_id: PeerId,
        raw_name: &str,
        is_rename: bool,
        in_game: bool,
    ) -> Result<Registration, SessionError> {
        if peer_id == 0 {
            warn!("Registration with peer id 0 rejected");
            return Err(Rejection::InvalidPeerId.into());
        }
        let name = self.sanitize_name(raw_name)?;

        match self.peers.get_mut(&peer_id) {
            Some(_) if !is_rename => Err(Rejection::Duplicate(peer_id).into()),
            Some(record) => {
                let previous = std::mem::replace(&mut record.name, name);
                Ok(Registration::Renamed { previous })
            }
            None => {
                self.peers
                    .insert(peer_id, PeerRecord::new(peer_id, name, in_game));
                Ok(Registration::Joined)
            }
        }
    }

    /// Record a canonical color.
    ///
    /// Returns `MissingReplica` when the peer has not spawned yet; the color
    /// is stored and marked pending in that case.
    pub fn update_color(&mut self, peer_id: PeerId, color: Color) -> Result<(), SessionError> {
        let record = self.require_mut(peer_id)?;
        record.color = color;
        if record.spawned {
            record.color_pending = false;
            Ok(())
        } else {
            record.color_pending = true;
            Err(SessionError::MissingReplica(peer_id))
        }
    }

    pub fn update_cosmetics(
        &mut self,
        peer_id: PeerId,
        expression_id: &str,
        hat_id: &str,
        character_id: &str,
    ) -> Result<(), SessionError> {
        let record = self.require_mut(peer_id)?;
        record.expression_id = expression_id.to_string();
        record.hat_id = hat_id.to_string();
        record.character_id = character_id.to_string();
        Ok(())
    }

    /// Mark a representation as spawned. Returns whether a color was waiting.
    pub fn mark_spawned(&mut self, peer_id: PeerId) -> Result<bool, SessionError> {
        let record = self.require_mut(peer_id)?;
        record.spawned = true;
        Ok(std::mem::take(&mut record.color_pending))
    }

    pub fn set_position(&mut self, peer_id: PeerId, position: Position) -> Result<(), SessionError> {
        let record = self.require_mut(peer_id)?;
        if !position.is_finite() {
            warn!("Ignoring non-finite position from peer {}", peer_id);
            return Ok(());
        }
        record.position = Some(position);
        Ok(())
    }

    /// Drop a record. Removing an absent peer is a no-op.
    pub fn remove(&mut self, peer_id: PeerId) -> Option<PeerRecord> {
        self.peers.remove(&peer_id)
    }

    /// Re-admit everyone at lobby entry.
    pub fn admit_all(&mut self) {
        for record in self.peers.values_mut() {
            record.in_game = true;
            record.level_loaded = false;
        }
    }

    pub fn reset_level_loaded(&mut self) {
        for record in self.peers.values_mut() {
            record.level_loaded = false;
        }
    }

    pub fn get(&self, peer_id: PeerId) -> Option<&PeerRecord> {
        self.peers.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: PeerId) -> Option<&mut PeerRecord> {
        self.peers.get_mut(&peer_id)
    }

    pub fn require(&self, peer_id: PeerId) -> Result<&PeerRecord, Rejection> {
        self.peers.get(&peer_id).ok_or(Rejection::UnknownPeer(peer_id))
    }

    fn require_mut(&mut self, peer_id: PeerId) -> Result<&mut PeerRecord, SessionError> {
        self.peers
            .get_mut(&peer_id)
            .ok_or(SessionError::InvalidRequest(Rejection::UnknownPeer(peer_id)))
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.peers.contains_key(&peer_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    /// Ids of peers taking part in the current round, ascending.
    pub fn in_game_ids(&self) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|record| record.in_game)
            .map(|record| record.peer_id)
            .collect()
    }

    pub fn display_name(&self, peer_id: PeerId) -> String {
        self.peers
            .get(&peer_id)
            .map(|record| record.name.clone())
            .unwrap_or_else(|| format!("Peer {peer_id}"))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_join_then_duplicate() {
        let mut registry = PeerRegistry::new(20);
        assert_eq!(registry.register(2, "Ada", false, true), Ok(Registration::Joined));
        assert_eq!(
            registry.register(2, "Ada", false, true),
            Err(SessionError::InvalidRequest(Rejection::Duplicate(2)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rename_keeps_record() {
        let mut registry = PeerRegistry::new(20);
        registry.register(2, "Ada", false, true).unwrap();
        registry.update_color(2, Color::new(1, 2, 3)).ok();

        assert_eq!(
            registry.register(2, "Grace", true, false),
            Ok(Registration::Renamed {
                previous: "Ada".into()
            })
        );
        let record = registry.get(2).unwrap();
        assert_eq!(record.name, "Grace");
        assert_eq!(record.color, Color::new(1, 2, 3));
        assert!(record.in_game);
    }

    #[test]
    fn test_rename_without_record_joins() {
        let mut registry = PeerRegistry::new(20);
        assert_eq!(registry.register(5, "Late", true, false), Ok(Registration::Joined));
        assert!(!registry.get(5).unwrap().in_game);
    }

    #[test]
    fn test_invalid_ids_and_names() {
        let mut registry = PeerRegistry::new(4);
        assert_eq!(
            registry.register(0, "Zero", false, true).unwrap_err().kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            registry.register(2, "   ", false, true),
            Err(SessionError::InvalidRequest(Rejection::InvalidName))
        );
        registry.register(2, "  Bartholomew ", false, true).unwrap();
        assert_eq!(registry.get(2).unwrap().name, "Bart");
    }

    #[test]
    fn test_color_waits_for_spawn() {
        let mut registry = PeerRegistry::new(20);
        registry.register(3, "Bo", false, true).unwrap();

        let err = registry.update_color(3, Color::RED).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingReplica);
        assert_eq!(registry.get(3).unwrap().color, Color::RED);

        assert_eq!(registry.mark_spawned(3), Ok(true));
        assert_eq!(registry.mark_spawned(3), Ok(false));
        assert_eq!(registry.update_color(3, Color::WHITE), Ok(()));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = PeerRegistry::new(20);
        registry.register(2, "Ada", false, true).unwrap();
        assert!(registry.remove(2).is_some());
        assert!(registry.remove(2).is_none());
        assert!(registry.is_empty());
    }
}
