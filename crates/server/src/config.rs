//! Server configuration.

use protocol::{Color, GameType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tag: TagConfig,
    #[serde(default)]
    pub freeplay: FreeplayConfig,
    #[serde(default = "default_teams")]
    pub teams: Vec<TeamConfig>,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml_str(&contents)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Parse configuration from TOML text; missing keys take defaults.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session could never act on.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            GameType::VOTABLE.contains(&self.session.default_game),
            "session.default_game must be a playable game, got '{}'",
            self.session.default_game
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            tag: TagConfig::default(),
            freeplay: FreeplayConfig::default(),
            teams: default_teams(),
        }
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Server name shown in the welcome message.
    #[serde(default = "default_name")]
    pub name: String,
    /// Tick interval in milliseconds (timers and tag proximity checks).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// When set, the server also plays as peer 1 under this name.
    #[serde(default)]
    pub host_name: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            name: default_name(),
            tick_interval_ms: default_tick_interval(),
            host_name: None,
        }
    }
}

fn default_port() -> u16 {
    24680
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    16
}
fn default_ip_limit() -> usize {
    16
}
fn default_name() -> String {
    "Party Server".to_string()
}
fn default_tick_interval() -> u64 {
    50
}

/// Phase timing and registration rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_voting_window")]
    pub voting_window_secs: u32,
    /// Longest time spent in Starting waiting for levels to load.
    #[serde(default = "default_start_delay")]
    pub start_delay_secs: u64,
    #[serde(default = "default_game_over_delay")]
    pub game_over_delay_secs: u64,
    /// How long a color update waits for the peer's representation.
    #[serde(default = "default_spawn_wait")]
    pub spawn_wait_ms: u64,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Winner when nobody voted.
    #[serde(default = "default_game")]
    pub default_game: GameType,
}

impl SessionConfig {
    pub fn voting_window(&self) -> Duration {
        Duration::from_secs(self.voting_window_secs as u64)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.start_delay_secs)
    }

    pub fn game_over_delay(&self) -> Duration {
        Duration::from_secs(self.game_over_delay_secs)
    }

    pub fn spawn_wait(&self) -> Duration {
        Duration::from_millis(self.spawn_wait_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voting_window_secs: default_voting_window(),
            start_delay_secs: default_start_delay(),
            game_over_delay_secs: default_game_over_delay(),
            spawn_wait_ms: default_spawn_wait(),
            max_name_length: default_max_name_length(),
            default_game: default_game(),
        }
    }
}

fn default_voting_window() -> u32 {
    30
}
fn default_start_delay() -> u64 {
    3
}
fn default_game_over_delay() -> u64 {
    5
}
fn default_spawn_wait() -> u64 {
    3000
}
fn default_max_name_length() -> usize {
    20
}
fn default_game() -> GameType {
    GameType::Tag
}

/// Tag minigame rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagConfig {
    /// Distance at or under which the tagger tags someone.
    #[serde(default = "default_tag_radius")]
    pub radius: f32,
    #[serde(default = "default_tag_time_limit")]
    pub time_limit_secs: u64,
    /// Ticks during which a fresh tagger cannot tag back whoever tagged them.
    #[serde(default)]
    pub tag_back_grace_ticks: u32,
    #[serde(default = "default_tagger_color")]
    pub tagger_color: Color,
    #[serde(default = "default_runner_color")]
    pub runner_color: Color,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            radius: default_tag_radius(),
            time_limit_secs: default_tag_time_limit(),
            tag_back_grace_ticks: 0,
            tagger_color: default_tagger_color(),
            runner_color: default_runner_color(),
        }
    }
}

fn default_tag_radius() -> f32 {
    48.0
}
fn default_tag_time_limit() -> u64 {
    120
}
fn default_tagger_color() -> Color {
    Color::RED
}
fn default_runner_color() -> Color {
    Color::WHITE
}

/// Minigames without server-side rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FreeplayConfig {
    #[serde(default = "default_freeplay_time_limit")]
    pub time_limit_secs: u64,
}

impl Default for FreeplayConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: default_freeplay_time_limit(),
        }
    }
}

fn default_freeplay_time_limit() -> u64 {
    180
}

/// A team players can join from the lobby.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamConfig {
    pub name: String,
    pub color: Color,
}

fn default_teams() -> Vec<TeamConfig> {
    vec![
        TeamConfig {
            name: "Red".to_string(),
            color: Color::new(220, 40, 40),
        },
        TeamConfig {
            name: "Blue".to_string(),
            color: Color::new(40, 80, 220),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.session.voting_window_secs, 30);
        assert_eq!(config.session.default_game, GameType::Tag);
        assert_eq!(config.tag.tagger_color, Color::RED);
        assert_eq!(config.teams.len(), 2);
        assert!(config.server.host_name.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 9000
            host_name = "Host"

            [session]
            voting_window_secs = 10
            default_game = "hide_and_seek"

            [tag]
            radius = 2.5
            tagger_color = { r = 200, g = 0, b = 0 }

            [[teams]]
            name = "Green"
            color = { r = 0, g = 255, b = 0 }
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.server.host_name.as_deref(), Some("Host"));
        assert_eq!(config.session.voting_window(), Duration::from_secs(10));
        assert_eq!(config.session.default_game, GameType::HideAndSeek);
        assert_eq!(config.tag.radius, 2.5);
        assert_eq!(config.tag.runner_color, Color::WHITE);
        assert_eq!(config.teams.len(), 1);
        assert_eq!(config.teams[0].name, "Green");
    }

    #[test]
    fn test_default_game_must_be_playable() {
        let err = Config::from_toml_str(
            r#"
            [session]
            default_game = "none"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_game"));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_roundtrip_default_file() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.session.spawn_wait_ms, 3000);
    }
}
