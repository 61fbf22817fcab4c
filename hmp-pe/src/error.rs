//! Error types for hmp-pe
//!
//! Mirrors the delivery failure taxonomy on the client side: resolution and
//! transfer failures come from the server, sink failures from the audio output.

use hmp_common::events::ErrorKind;
use thiserror::Error;

/// Main error type for hmp-pe
#[derive(Error, Debug)]
pub enum Error {
    /// The server found nothing to stream (404)
    #[error("Track could not be resolved: {0}")]
    Resolution(String),

    /// Network or stream failure while fetching
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The server rejected a byte range (416)
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Audio sink refused or failed an operation
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine task has shut down
    #[error("Playback engine stopped")]
    EngineStopped,

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience Result type using hmp-pe Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Category reported in `PlayerEvent::Error`
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Resolution(_) => ErrorKind::Resolution,
            Error::Sink(_) => ErrorKind::Sink,
            Error::Transfer(_)
            | Error::InvalidRange(_)
            | Error::Config(_)
            | Error::EngineStopped
            | Error::Http(_) => ErrorKind::Transfer,
        }
    }
}

impl From<hmp_common::Error> for Error {
    fn from(err: hmp_common::Error) -> Self {
        Error::Config(err.to_string())
    }
}
