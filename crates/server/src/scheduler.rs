//! Cancellable one-shot timers.
//!
//! Nothing here sleeps. The owner calls [`Scheduler::due`] from its tick
//! and handles whatever fired, so every suspension point of the session is
//! an explicit entry in this table.

use protocol::PeerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Everything the session can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    VotingWindow,
    StartCountdown,
    GameTimeLimit,
    ReturnToLobby,
    SpawnWait(PeerId),
}

#[derive(Debug, Default)]
pub struct Scheduler {
    deadlines: HashMap<TimerKind, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer, replacing any earlier deadline for the same kind.
    pub fn schedule(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        self.deadlines.insert(kind, now + delay);
    }

    /// Disarm a timer. Returns whether it was armed.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.deadlines.remove(&kind).is_some()
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    /// Time left before `kind` fires.
    pub fn remaining(&self, kind: TimerKind, now: Instant) -> Option<Duration> {
        self.deadlines
            .get(&kind)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and return every timer whose deadline has passed, earliest
    /// first.
    pub fn due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut fired: Vec<(Instant, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= now)
            .map(|(&kind, &deadline)| (deadline, kind))
            .collect();
        fired.sort();
        for (_, kind) in &fired {
            self.deadlines.remove(kind);
        }
        fired.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_in_deadline_order() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(TimerKind::GameTimeLimit, t0, Duration::from_secs(5));
        scheduler.schedule(TimerKind::SpawnWait(4), t0, Duration::from_secs(2));

        assert!(scheduler.due(t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(
            scheduler.due(t0 + Duration::from_secs(6)),
            vec![TimerKind::SpawnWait(4), TimerKind::GameTimeLimit]
        );
        assert!(scheduler.due(t0 + Duration::from_secs(7)).is_empty());
    }

    #[test]
    fn test_cancel_and_reschedule() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(TimerKind::VotingWindow, t0, Duration::from_secs(30));
        assert!(scheduler.cancel(TimerKind::VotingWindow));
        assert!(!scheduler.cancel(TimerKind::VotingWindow));
        assert!(scheduler.due(t0 + Duration::from_secs(60)).is_empty());

        scheduler.schedule(TimerKind::VotingWindow, t0, Duration::from_secs(1));
        scheduler.schedule(TimerKind::VotingWindow, t0, Duration::from_secs(10));
        assert_eq!(
            scheduler.remaining(TimerKind::VotingWindow, t0 + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert!(scheduler.due(t0 + Duration::from_secs(5)).is_empty());
    }
}
