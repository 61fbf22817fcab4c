//! Playback engine
//!
//! Actor-based coordinator for one track at a time: opens the progressive
//! stream and the full download concurrently, plays the former immediately and
//! upgrades to the latter once it completes.
//!
//! - `core`: engine handle, actor loop, lifecycle
//! - `playback`: track start, fetch completions, upgrade, transport
//! - `diagnostics`: snapshots and sink event translation

mod core;
mod diagnostics;
mod playback;

pub use self::core::PlaybackEngine;
pub use diagnostics::EngineSnapshot;
pub use playback::SEEK_WHILE_LOADING;
