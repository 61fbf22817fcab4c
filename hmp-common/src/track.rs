//! Track descriptor model
//!
//! A [`TrackDescriptor`] identifies what the delivery endpoint must resolve.
//! It travels from the player to the server either as a URL-encoded JSON query
//! parameter (progressive mode) or inside a JSON body (buffered mode).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote provider a track was found on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackSource {
    Youtube,
    Soundcloud,
    Spotify,
}

impl TrackSource {
    /// All known providers, in configuration order
    pub const ALL: [TrackSource; 3] = [
        TrackSource::Youtube,
        TrackSource::Soundcloud,
        TrackSource::Spotify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackSource::Youtube => "youtube",
            TrackSource::Soundcloud => "soundcloud",
            TrackSource::Spotify => "spotify",
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "youtube" => Ok(TrackSource::Youtube),
            "soundcloud" => Ok(TrackSource::Soundcloud),
            "spotify" => Ok(TrackSource::Spotify),
            other => Err(Error::InvalidInput(format!("Unknown track source: {}", other))),
        }
    }
}

/// Track descriptor
///
/// Immutable once handed to a play request. Extra fields sent by search
/// results (thumbnail, duration, ...) are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackDescriptor {
    /// Provider-specific track identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// Display artist, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Provider the track comes from
    pub source: TrackSource,
    /// Provider URL used by the resolver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TrackDescriptor {
    /// Parse a descriptor from its JSON representation
    pub fn parse_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid track descriptor: {}", e)))
    }

    /// Serialize to the compact JSON form used in the `trackData` query parameter
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize track descriptor: {}", e)))
    }

    /// `"artist - title"` when an artist is known, otherwise just the title
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) if !artist.is_empty() => format!("{} - {}", artist, self.title),
            _ => self.title.clone(),
        }
    }
}
