//! Player/device binding configuration.
//!
//! A small TOML file tells the relay which player it serves, which
//! peripherals belong to that player, where the game engine lives, and
//! lets timing constants be tuned without reflashing. Everything has a
//! default; a missing file means "player 1, defaults".

use std::fs;
use std::path::Path;

use serde::Deserialize;

use taglink_core::{DEBOUNCE_MS, IMU_INTERVAL_MS, RESPONSE_TIMEOUT_MS};

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The whole binding file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    /// Which player this relay serves (1 or 2).
    #[serde(default = "default_player_id")]
    pub player_id: u8,
    #[serde(default)]
    pub devices: Devices,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub timing: Timing,
}

/// MAC addresses of the player's three peripherals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Devices {
    #[serde(default)]
    pub gun: String,
    #[serde(default)]
    pub vest: String,
    #[serde(default)]
    pub hand: String,
}

/// Where the relay forwards game events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Engine {
    #[serde(default = "default_engine_host")]
    pub host: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
}

/// Timing overrides, defaulting to the protocol constants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timing {
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_imu_interval")]
    pub imu_interval_ms: u64,
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

impl BindingConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            player_id: default_player_id(),
            devices: Devices::default(),
            engine: Engine::default(),
            timing: Timing::default(),
        }
    }
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            gun: String::new(),
            vest: String::new(),
            hand: String::new(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            host: default_engine_host(),
            port: default_engine_port(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
            imu_interval_ms: default_imu_interval(),
            debounce_ms: default_debounce(),
        }
    }
}

fn default_player_id() -> u8 {
    1
}

fn default_engine_host() -> String {
    "127.0.0.1".to_string()
}

fn default_engine_port() -> u16 {
    8888
}

fn default_response_timeout() -> u64 {
    RESPONSE_TIMEOUT_MS
}

fn default_imu_interval() -> u64 {
    IMU_INTERVAL_MS
}

fn default_debounce() -> u64 {
    DEBOUNCE_MS
}
