//! Lobby teams.

use std::collections::{BTreeMap, BTreeSet};

use protocol::{Color, PeerId, TeamInfo};

use crate::config::TeamConfig;
use crate::error::Rejection;

#[derive(Debug, Clone)]
pub struct Team {
    pub team_id: u32,
    pub name: String,
    pub color: Color,
    pub members: BTreeSet<PeerId>,
}

impl Team {
    /// Full-value snapshot for `AnnounceTeam`.
    pub fn info(&self) -> TeamInfo {
        TeamInfo {
            team_id: self.team_id,
            name: self.name.clone(),
            color: self.color,
            members: self.members.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TeamRegistry {
    teams: BTreeMap<u32, Team>,
}

impl TeamRegistry {
    /// Teams are numbered in configuration order starting at 0.
    pub fn from_config(teams: &[TeamConfig]) -> Self {
        let teams = teams
            .iter()
            .zip(0u32..)
            .map(|(team, team_id)| {
                (
                    team_id,
                    Team {
                        team_id,
                        name: team.name.clone(),
                        color: team.color,
                        members: BTreeSet::new(),
                    },
                )
            })
            .collect();
        Self { teams }
    }

    pub fn team_of(&self, peer_id: PeerId) -> Option<u32> {
        self.teams
            .values()
            .find(|team| team.members.contains(&peer_id))
            .map(|team| team.team_id)
    }

    /// Move a peer into a team. Returns the snapshots of every team touched,
    /// empty when the peer was already a member.
    pub fn join(&mut self, peer_id: PeerId, team_id: u32) -> Result<Vec<TeamInfo>, Rejection> {
        if !self.teams.contains_key(&team_id) {
            return Err(Rejection::UnknownTeam(team_id));
        }
        if self.team_of(peer_id) == Some(team_id) {
            return Ok(Vec::new());
        }

        let mut touched = self.leave(peer_id).into_iter().collect::<Vec<_>>();
        if let Some(team) = self.teams.get_mut(&team_id) {
            team.members.insert(peer_id);
            touched.push(team.info());
        }
        Ok(touched)
    }

    /// Remove a peer from whatever team holds it.
    pub fn leave(&mut self, peer_id: PeerId) -> Option<TeamInfo> {
        self.teams
            .values_mut()
            .find(|team| team.members.contains(&peer_id))
            .map(|team| {
                team.members.remove(&peer_id);
                team.info()
            })
    }

    pub fn snapshot(&self) -> Vec<TeamInfo> {
        self.teams.values().map(Team::info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TeamRegistry {
        TeamRegistry::from_config(&[
            TeamConfig {
                name: "Red".into(),
                color: Color::RED,
            },
            TeamConfig {
                name: "Blue".into(),
                color: Color::new(0, 0, 255),
            },
        ])
    }

    #[test]
    fn test_switching_touches_both_teams() {
        let mut teams = registry();
        assert_eq!(teams.join(2, 0).unwrap().len(), 1);

        let touched = teams.join(2, 1).unwrap();
        assert_eq!(touched.len(), 2);
        assert!(touched[0].members.is_empty());
        assert_eq!(touched[1].members, vec![2]);
        assert_eq!(teams.team_of(2), Some(1));

        assert!(teams.join(2, 1).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_team() {
        let mut teams = registry();
        assert_eq!(teams.join(2, 9), Err(Rejection::UnknownTeam(9)));
        assert_eq!(teams.team_of(2), None);
    }

    #[test]
    fn test_leave() {
        let mut teams = registry();
        teams.join(3, 0).unwrap();
        assert_eq!(teams.leave(3).map(|team| team.team_id), Some(0));
        assert!(teams.leave(3).is_none());
        assert!(teams.snapshot().iter().all(|team| team.members.is_empty()));
    }
}
