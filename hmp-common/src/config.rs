//! Configuration loading
//!
//! One TOML file configures both the delivery server and the player.
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `HMP_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/hmp/config.toml`)
//!
//! A missing file is not fatal: a warning is logged and compiled defaults are
//! used. A file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HMP_CONFIG";

/// Default upper bound for a fully buffered track held in server memory
pub const DEFAULT_MAX_BUFFERED_BYTES: u64 = 256 * 1024 * 1024;

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerSection,
    pub player: PlayerSection,
    pub logging: LoggingConfig,
    /// Resolver configuration keyed by provider name (`youtube`, ...)
    pub providers: HashMap<String, ProviderConfig>,
}

/// `[server]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin, `*` for any
    pub cors_origin: String,
    /// Upper bound for buffered-mode responses held in memory
    pub max_buffered_bytes: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origin: "*".to_string(),
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
        }
    }
}

/// `[player]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSection {
    /// Base URL of the delivery server
    pub backend_url: String,
    /// `hybrid`, `progressive` or `buffered`
    pub strategy: String,
    /// Interval between `timeupdate` ticks of the headless sink
    pub time_update_interval_ms: u64,
    /// EventBus capacity
    pub event_capacity: usize,
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3001".to_string(),
            strategy: "hybrid".to_string(),
            time_update_interval_ms: 250,
            event_capacity: 512,
        }
    }
}

/// `[logging]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[providers.<name>]` table: how the server resolves tracks of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Run an extractor program and stream its stdout.
    /// `{url}` and `{id}` in `args` are replaced with the track's values.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_content_type")]
        content_type: String,
    },
    /// Fetch `track.url` directly over HTTP
    Http {
        #[serde(default)]
        content_type: Option<String>,
    },
}

fn default_content_type() -> String {
    "audio/webm".to_string()
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse config text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Locate and load the config file, falling back to defaults when none exists
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match locate_config_file(cli_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("No config directory available, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Resolve which config file to use (it may not exist)
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path()
}

/// `<config_dir>/hmp/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hmp").join("config.toml"))
}
