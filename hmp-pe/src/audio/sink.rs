//! Audio sink seam
//!
//! The engine never decodes audio itself. It installs sources on an
//! [`AudioSink`] (a media element, a native output, the headless reference
//! sink) and reacts to the [`SinkEvent`]s the sink reports.

use super::analyser::SharedAnalyser;
use crate::error::Result;
use crate::playback::session::BufferedPayload;
use async_trait::async_trait;
use hmp_common::ByteStream;
use tokio::sync::mpsc;

/// A time range in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Clamp `time` into this range
    pub fn clamp(&self, time: f64) -> f64 {
        time.max(self.start).min(self.end)
    }
}

/// What the sink plays from
pub enum SinkSource {
    /// Streaming body of unknown length
    Progressive {
        content_type: String,
        stream: ByteStream,
    },
    /// Complete in-memory payload
    Buffered(BufferedPayload),
}

impl SinkSource {
    pub fn is_buffered(&self) -> bool {
        matches!(self, SinkSource::Buffered(_))
    }
}

impl std::fmt::Debug for SinkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkSource::Progressive { content_type, .. } => f
                .debug_struct("Progressive")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            SinkSource::Buffered(payload) => f
                .debug_struct("Buffered")
                .field("len", &payload.len())
                .finish(),
        }
    }
}

/// Notifications from the sink, modelled on media element events
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    LoadStart,
    LoadedMetadata,
    DurationChange(f64),
    CanPlay,
    CanPlayThrough,
    Play,
    Playing,
    Pause,
    /// Stalled waiting for data
    Waiting,
    TimeUpdate(f64),
    /// More data arrived; query [`AudioSink::buffered`]
    Progress,
    Seeking(f64),
    Seeked(f64),
    Ended,
    Error(String),
}

/// A [`SinkEvent`] tagged with the epoch of the load it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SinkMessage {
    pub epoch: u64,
    pub event: SinkEvent,
}

pub type SinkEventSender = mpsc::UnboundedSender<SinkMessage>;
pub type SinkEventReceiver = mpsc::UnboundedReceiver<SinkMessage>;

/// Channel pair used to connect a sink to the engine
pub fn sink_event_channel() -> (SinkEventSender, SinkEventReceiver) {
    mpsc::unbounded_channel()
}

/// Audio output driven by the playback engine
///
/// Exactly one source is installed at a time. `load` replaces (and releases)
/// the previous source; `unload` releases it without a replacement.
///
/// Every event is reported with the epoch of the most recent `load`,
/// including events produced by background work started for that load.
/// Receivers drop events whose epoch they no longer expect.
#[async_trait]
pub trait AudioSink: Send + 'static {
    /// Install `source` under `epoch`, releasing the current one; playback is paused
    fn load(&mut self, epoch: u64, source: SinkSource);

    /// Release the current source
    fn unload(&mut self);

    /// Start or resume playback
    ///
    /// Resolves once the sink has accepted the request; an `Err` means
    /// playback did not start.
    async fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Current position in seconds
    fn position(&self) -> f64;

    fn set_position(&mut self, seconds: f64);

    /// Duration in seconds, `None` while unknown
    fn duration(&self) -> Option<f64>;

    /// Ranges the sink can seek into
    fn seekable(&self) -> Vec<TimeRange>;

    /// Ranges the sink has data for
    fn buffered(&self) -> Vec<TimeRange>;

    /// Output gain in `[0, 1]`
    fn set_gain(&mut self, gain: f32);

    fn gain(&self) -> f32;

    /// Route output through `analyser` as well
    fn attach_analyser(&mut self, analyser: SharedAnalyser);

    fn detach_analyser(&mut self);
}
