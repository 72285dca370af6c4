//! Addressed broadcasts waiting for the transport.

use protocol::{Broadcast, PeerId};

/// Who receives an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Peer(PeerId),
    AllExcept(PeerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub target: Target,
    pub message: Broadcast,
}

impl Envelope {
    pub fn reaches(&self, peer_id: PeerId) -> bool {
        match self.target {
            Target::All => true,
            Target::Peer(id) => id == peer_id,
            Target::AllExcept(id) => id != peer_id,
        }
    }
}

/// Messages produced while handling one event, in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast(&mut self, message: Broadcast) {
        self.push(Target::All, message);
    }

    pub fn unicast(&mut self, peer_id: PeerId, message: Broadcast) {
        self.push(Target::Peer(peer_id), message);
    }

    pub fn broadcast_except(&mut self, peer_id: PeerId, message: Broadcast) {
        self.push(Target::AllExcept(peer_id), message);
    }

    pub fn system_message(&mut self, text: impl Into<String>) {
        self.broadcast(Broadcast::SystemMessage { text: text.into() });
    }

    fn push(&mut self, target: Target, message: Broadcast) {
        self.queue.push(Envelope { target, message });
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.queue)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        let mut outbox = Outbox::new();
        outbox.unicast(2, Broadcast::Welcome { peer_id: 2 });
        outbox.broadcast_except(2, Broadcast::AnnouncePeerLeft { peer_id: 4 });
        outbox.system_message("hi");

        let sent = outbox.drain();
        assert!(outbox.is_empty());
        assert!(sent[0].reaches(2) && !sent[0].reaches(3));
        assert!(!sent[1].reaches(2) && sent[1].reaches(3));
        assert!(sent[2].reaches(1));
    }
}
