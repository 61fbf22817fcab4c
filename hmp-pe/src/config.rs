//! Playback engine configuration

use crate::error::{Error, Result};
use hmp_common::config::TomlConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How a track is fetched and when it becomes seekable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStrategy {
    /// Start on the progressive stream, upgrade to the buffered payload
    #[default]
    Hybrid,
    /// Progressive stream only; never seekable beyond what the sink allows
    Progressive,
    /// Download fully, then play
    Buffered,
}

impl PlayStrategy {
    /// Whether a progressive stream is opened
    pub fn uses_progressive(self) -> bool {
        matches!(self, PlayStrategy::Hybrid | PlayStrategy::Progressive)
    }

    /// Whether the full download is requested
    pub fn uses_buffered(self) -> bool {
        matches!(self, PlayStrategy::Hybrid | PlayStrategy::Buffered)
    }
}

impl fmt::Display for PlayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayStrategy::Hybrid => write!(f, "hybrid"),
            PlayStrategy::Progressive => write!(f, "progressive"),
            PlayStrategy::Buffered => write!(f, "buffered"),
        }
    }
}

impl FromStr for PlayStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hybrid" => Ok(PlayStrategy::Hybrid),
            "progressive" | "fast" => Ok(PlayStrategy::Progressive),
            "buffered" | "full" => Ok(PlayStrategy::Buffered),
            other => Err(Error::Config(format!("Unknown play strategy: {}", other))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the delivery server (no trailing slash)
    pub backend_url: String,
    /// Default strategy for `play_track`
    pub strategy: PlayStrategy,
    /// `timeupdate` interval of the headless sink
    pub time_update_interval: Duration,
    /// EventBus capacity
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default()).unwrap_or_else(|_| Self {
            backend_url: "http://localhost:3001".to_string(),
            strategy: PlayStrategy::Hybrid,
            time_update_interval: Duration::from_millis(250),
            event_capacity: 512,
        })
    }
}

impl EngineConfig {
    /// Build from the `[player]` table
    pub fn from_toml(toml: &TomlConfig) -> Result<Self> {
        let player = &toml.player;
        if player.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".to_string()));
        }
        if player.time_update_interval_ms == 0 {
            return Err(Error::Config(
                "time_update_interval_ms must be positive".to_string(),
            ));
        }

        Ok(Self {
            backend_url: player.backend_url.trim_end_matches('/').to_string(),
            strategy: player.strategy.parse()?,
            time_update_interval: Duration::from_millis(player.time_update_interval_ms),
            event_capacity: player.event_capacity,
        })
    }
}
