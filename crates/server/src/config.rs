//! Server configuration, loadable from TOML.
//!
//! Every key is optional; missing keys take the defaults below. Durations
//! are whole milliseconds.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Runtime parameters of the session server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP/WebSocket edge binds.
    pub listen: SocketAddr,
    /// How long a lone joiner waits before being paired with the automated
    /// opponent.
    pub matchmaking_grace_ms: u64,
    /// How long a disconnected seat is held for rejoin.
    pub reconnect_grace_ms: u64,
    /// Delay before the automated seat answers a human move. Zero answers
    /// within the same message.
    pub opponent_delay_ms: u64,
    /// How long a finished session stays addressable before it is dropped.
    pub finished_retention_ms: u64,
    /// Rows in every leaderboard snapshot.
    pub leaderboard_limit: usize,
    /// Longest accepted username, in characters.
    pub max_identity_len: usize,
    /// Display name of the automated seat.
    pub automated_name: String,
    /// Append-only record file. Records stay in memory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 4000)),
            matchmaking_grace_ms: 10_000,
            reconnect_grace_ms: 30_000,
            opponent_delay_ms: 200,
            finished_retention_ms: 60_000,
            leaderboard_limit: 10,
            max_identity_len: 32,
            automated_name: "BOT".to_string(),
            records_path: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: ServerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matchmaking_grace_ms == 0 {
            return Err(ConfigError::Validation(
                "matchmaking_grace_ms must be > 0".into(),
            ));
        }
        if self.reconnect_grace_ms == 0 {
            return Err(ConfigError::Validation(
                "reconnect_grace_ms must be > 0".into(),
            ));
        }
        if self.finished_retention_ms == 0 {
            return Err(ConfigError::Validation(
                "finished_retention_ms must be > 0".into(),
            ));
        }
        if self.leaderboard_limit == 0 {
            return Err(ConfigError::Validation(
                "leaderboard_limit must be > 0".into(),
            ));
        }
        if self.max_identity_len == 0 {
            return Err(ConfigError::Validation(
                "max_identity_len must be > 0".into(),
            ));
        }
        let name = self.automated_name.trim();
        if name.is_empty() || name.chars().count() > self.max_identity_len {
            return Err(ConfigError::Validation(
                "automated_name must be non-empty and within max_identity_len".into(),
            ));
        }
        Ok(())
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn matchmaking_grace(&self) -> Duration {
        Duration::from_millis(self.matchmaking_grace_ms)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }

    pub fn opponent_delay(&self) -> Duration {
        Duration::from_millis(self.opponent_delay_ms)
    }

    pub fn finished_retention(&self) -> Duration {
        Duration::from_millis(self.finished_retention_ms)
    }
}
