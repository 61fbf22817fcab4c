//! # HMP Playback Engine Library (hmp-pe)
//!
//! Client side of the hybrid streaming protocol.
//!
//! **Purpose:** Start a track on the progressive stream within one round
//! trip, download the full payload concurrently and switch to it without
//! losing position, so the track becomes freely seekable.
//!
//! **Architecture:** One engine actor owning an [`audio::AudioSink`]; the
//! [`facade::PlaybackFacade`] is the consumer-facing surface.

pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod facade;
pub mod playback;

pub use error::{Error, Result};
pub use facade::{FacadeState, PlaybackFacade};
pub use playback::{EngineSnapshot, PlaybackEngine};
