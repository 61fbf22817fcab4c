//! # HMP Stream Delivery Library (hmp-sd)
//!
//! Serves one resolved audio stream through two transfer contracts:
//! - progressive (`GET /stream/play`): piped as it arrives, starts instantly
//! - buffered (`POST /stream/play`): fully drained, length known, byte ranges honored
//!
//! Track resolution (provider search/extraction) sits behind the
//! [`resolver::TrackResolver`] seam.

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod resolver;

pub use error::{Error, Result};
