use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;
use super::state::{DEFAULT_VOLUME, MAX_VOLUME};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Locations of the two static channel lists (flat JSON objects).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_radio_file")]
    pub radio_file: PathBuf,
    #[serde(default = "default_tv_file")]
    pub tv_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Backend names in probe order.  Unknown names are ignored.
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
    /// How long a player gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Pause after spawning, to catch players that die immediately.
    #[serde(default = "default_spawn_grace_ms")]
    pub spawn_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Volume used when no snapshot exists yet.
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Start playing at daemon startup if the snapshot says it was running.
    #[serde(default)]
    pub resume_on_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            radio_file: default_radio_file(),
            tv_file: default_tv_file(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            stop_timeout_ms: default_stop_timeout_ms(),
            spawn_grace_ms: default_spawn_grace_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            resume_on_start: false,
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_radio_file() -> PathBuf {
    platform::data_dir().join("channels_radio.json")
}

fn default_tv_file() -> PathBuf {
    platform::data_dir().join("channels_tv.json")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_backends() -> Vec<String> {
    vec!["vlc".to_string(), "ffplay".to_string()]
}

fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_spawn_grace_ms() -> u64 {
    50
}

fn default_volume() -> u8 {
    DEFAULT_VOLUME
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.session.default_volume = config.session.default_volume.min(MAX_VOLUME);
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
