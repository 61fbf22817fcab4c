//! Event types for the HMP playback event system
//!
//! Provides the typed player event surface and the EventBus that carries it.
//! Payload types are checked at compile time; there is no string-keyed
//! listener registry.

use crate::track::TrackDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Buffering phase of a playback session
///
/// Ordered: a session only ever moves forward through
/// `Idle → ProgressiveOnly → DownloadingFull → FullyBuffered`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BufferingPhase {
    /// Session created, nothing requested yet
    Idle,
    /// Progressive stream requested; no full download under way
    ProgressiveOnly,
    /// Full download accepted by the server and draining
    DownloadingFull,
    /// Buffered payload installed; random access available
    FullyBuffered,
}

impl BufferingPhase {
    /// Whether `next` is a legal forward step from `self`
    ///
    /// `Idle → DownloadingFull` is allowed for sessions that never open a
    /// progressive stream (buffered-only playback).
    pub fn can_advance_to(self, next: BufferingPhase) -> bool {
        use BufferingPhase::*;
        matches!(
            (self, next),
            (Idle, ProgressiveOnly)
                | (Idle, DownloadingFull)
                | (ProgressiveOnly, DownloadingFull)
                | (DownloadingFull, FullyBuffered)
        )
    }

    /// Seeking is unrestricted only once the payload is fully buffered
    pub fn is_seekable(self) -> bool {
        self == BufferingPhase::FullyBuffered
    }
}

impl fmt::Display for BufferingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferingPhase::Idle => write!(f, "idle"),
            BufferingPhase::ProgressiveOnly => write!(f, "progressive-only"),
            BufferingPhase::DownloadingFull => write!(f, "downloading-full"),
            BufferingPhase::FullyBuffered => write!(f, "fully-buffered"),
        }
    }
}

/// Transfer mode the sink is currently playing from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Non-seekable progressive stream
    Progressive,
    /// Fully buffered, randomly seekable payload
    Seekable,
}

/// Classification of fatal player errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The server could not resolve the track to a stream
    Resolution,
    /// The transfer broke before playback could start
    Transfer,
    /// The audio sink failed
    Sink,
}

/// Player events
///
/// Ordering guarantees for one track:
/// - `Loading` precedes the first `CanPlay` / `Playing`
/// - `Play` / `Pause` mirror sink-reported transitions, never requested intent
/// - `Upgraded` is emitted at most once
/// - `Error` is reserved for unrecoverable failures; buffered-download
///   failures are reported as `Warning`
///
/// `TimeUpdate` and `Duration` are advisory and may arrive at any rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A new source started loading
    Loading,

    /// Source metadata (duration, format) is known
    Metadata,

    /// Enough data to start playback
    CanPlay,

    /// Enough data to play to the end without stalling
    CanPlayThrough,

    /// Sink reported playback started
    Play,

    /// Sink reported audio is actually being produced
    Playing,

    /// Sink reported playback paused
    Pause,

    /// Sink stalled waiting for data
    Buffering,

    /// Current playback position (seconds)
    TimeUpdate { position: f64 },

    /// Media duration changed (seconds)
    Duration { duration: f64 },

    /// Playback reached the end of the media
    Ended,

    /// A seek started
    Seeking { position: f64 },

    /// A seek completed
    Seeked { position: f64 },

    /// Buffered-range progress
    BufferProgress {
        /// Percentage of the duration covered by the last buffered range
        percent: f64,
        /// End of the last buffered range (seconds)
        buffered_end: f64,
        /// Media duration (seconds)
        duration: f64,
    },

    /// Playback started for a track in the given mode
    Playback {
        track: TrackDescriptor,
        mode: PlaybackMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffering phase transition
    PhaseChanged { phase: BufferingPhase },

    /// Full download requested
    DownloadStarted,

    /// Full download complete
    DownloadFinished,

    /// Sink source swapped to the buffered payload
    Upgraded {
        /// Position restored on the buffered source (seconds)
        position: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Seek requested before the payload is fully buffered
    SeekWarning { message: String },

    /// Recoverable problem (e.g. the full download failed; progressive
    /// playback continues)
    Warning {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Unrecoverable failure for the current track
    Error {
        kind: ErrorKind,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event name as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Loading => "loading",
            PlayerEvent::Metadata => "metadata",
            PlayerEvent::CanPlay => "canplay",
            PlayerEvent::CanPlayThrough => "canplaythrough",
            PlayerEvent::Play => "play",
            PlayerEvent::Playing => "playing",
            PlayerEvent::Pause => "pause",
            PlayerEvent::Buffering => "buffering",
            PlayerEvent::TimeUpdate { .. } => "timeupdate",
            PlayerEvent::Duration { .. } => "duration",
            PlayerEvent::Ended => "ended",
            PlayerEvent::Seeking { .. } => "seeking",
            PlayerEvent::Seeked { .. } => "seeked",
            PlayerEvent::BufferProgress { .. } => "bufferprogress",
            PlayerEvent::Playback { .. } => "playback",
            PlayerEvent::PhaseChanged { .. } => "phasechanged",
            PlayerEvent::DownloadStarted => "startdownload",
            PlayerEvent::DownloadFinished => "enddownload",
            PlayerEvent::Upgraded { .. } => "upgraded",
            PlayerEvent::SeekWarning { .. } => "seekwarning",
            PlayerEvent::Warning { .. } => "warning",
            PlayerEvent::Error { .. } => "error",
        }
    }

    /// High-frequency events that should not be logged above `trace`
    pub fn is_tick(&self) -> bool {
        matches!(
            self,
            PlayerEvent::TimeUpdate { .. } | PlayerEvent::BufferProgress { .. }
        )
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        PlayerEvent::Error {
            kind,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        PlayerEvent::Warning {
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event distribution bus for player events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// `timeupdate` ticks arrive several times per second, so subscribers that
    /// only poll occasionally need a few hundred slots to avoid lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
