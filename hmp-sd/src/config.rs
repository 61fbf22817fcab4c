//! hmp-sd specific configuration
//!
//! Resolved from the shared TOML file, then overridden by command-line
//! flags / environment variables (see `main.rs`).

use crate::error::{Error, Result};
use hmp_common::config::{ProviderConfig, TomlConfig};
use hmp_common::TrackSource;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Stream delivery server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin, `*` for any
    pub cors_origin: String,
    /// Upper bound for a track held in memory by buffered mode
    pub max_buffered_bytes: u64,
    /// Resolver configuration per provider; providers absent here resolve to 404
    pub providers: HashMap<TrackSource, ProviderConfig>,
}

/// Command-line / environment overrides, `None` meaning "keep the TOML value"
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_origin: Option<String>,
    pub max_buffered_bytes: Option<u64>,
}

impl Config {
    /// Build from the parsed TOML file
    pub fn from_toml(toml: &TomlConfig) -> Result<Self> {
        let mut providers = HashMap::new();
        for (name, provider) in &toml.providers {
            let source: TrackSource = name
                .parse()
                .map_err(|_| Error::Config(format!("Unknown provider table [providers.{}]", name)))?;
            providers.insert(source, provider.clone());
        }

        Ok(Self {
            host: toml.server.host.clone(),
            port: toml.server.port,
            cors_origin: toml.server.cors_origin.clone(),
            max_buffered_bytes: toml.server.max_buffered_bytes,
            providers,
        })
    }

    /// Apply higher-priority values on top of the file configuration
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(origin) = overrides.cors_origin {
            self.cors_origin = origin;
        }
        if let Some(limit) = overrides.max_buffered_bytes {
            self.max_buffered_bytes = limit;
        }
        self
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| Error::Config(format!("Invalid host {:?}: {}", self.host, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_maps_provider_names() {
        let toml = TomlConfig::parse(
            r#"
            [providers.youtube]
            kind = "command"
            program = "yt-dlp"
            "#,
        )
        .unwrap();

        let config = Config::from_toml(&toml).unwrap();
        assert!(config.providers.contains_key(&TrackSource::Youtube));
        assert!(!config.providers.contains_key(&TrackSource::Spotify));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let toml = TomlConfig::parse(
            r#"
            [providers.deezer]
            kind = "http"
            "#,
        )
        .unwrap();

        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_take_priority() {
        let config = Config::from_toml(&TomlConfig::default())
            .unwrap()
            .with_overrides(Overrides {
                port: Some(8080),
                cors_origin: Some("http://localhost:3000".to_string()),
                ..Default::default()
            });

        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origin, "http://localhost:3000");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::from_toml(&TomlConfig::default()).unwrap();
        config.host = "not-an-ip".to_string();
        assert!(config.bind_addr().is_err());
    }
}
