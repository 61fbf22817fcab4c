//! Playback coordination

pub mod engine;
pub mod session;

pub use engine::{EngineSnapshot, PlaybackEngine, SEEK_WHILE_LOADING};
pub use session::{BufferedPayload, PlaybackSession};
