//! Temporary per-game colors layered over canonical ones.

use std::collections::BTreeMap;

use protocol::{Color, PeerId};

/// Snapshot of canonical colors plus the overrides shown on top of them.
#[derive(Debug, Default)]
pub struct ColorOverrides {
    originals: BTreeMap<PeerId, Color>,
    active: BTreeMap<PeerId, Color>,
}

impl ColorOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember canonical colors before the first override. Peers already
    /// captured keep their snapshot.
    pub fn snapshot(&mut self, colors: impl IntoIterator<Item = (PeerId, Color)>) {
        for (peer_id, color) in colors {
            self.originals.entry(peer_id).or_insert(color);
        }
    }

    /// Set overrides and return them in broadcast form.
    pub fn apply(&mut self, colors: &[(PeerId, Color)]) -> Vec<(PeerId, Color)> {
        for &(peer_id, color) in colors {
            self.active.insert(peer_id, color);
        }
        colors.to_vec()
    }

    /// Follow a canonical color change made while overrides are active, so
    /// restoring replays it.
    pub fn record_canonical(&mut self, peer_id: PeerId, color: Color) {
        if let Some(original) = self.originals.get_mut(&peer_id) {
            *original = color;
        }
    }

    pub fn forget(&mut self, peer_id: PeerId) {
        self.originals.remove(&peer_id);
        self.active.remove(&peer_id);
    }

    pub fn active(&self) -> Vec<(PeerId, Color)> {
        self.active.iter().map(|(&id, &color)| (id, color)).collect()
    }

    /// Drop every override and hand back the snapshot to broadcast.
    pub fn restore(&mut self) -> Vec<(PeerId, Color)> {
        self.active.clear();
        std::mem::take(&mut self.originals).into_iter().collect()
    }
}
