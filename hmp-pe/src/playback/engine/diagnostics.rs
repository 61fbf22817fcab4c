//! Engine state reporting
//!
//! Snapshot publication and translation of sink events into player events.

use super::core::EngineActor;
use crate::audio::{SinkEvent, SinkMessage, TimeRange};
use crate::config::PlayStrategy;
use hmp_common::events::{BufferingPhase, ErrorKind, PlayerEvent};
use hmp_common::TrackDescriptor;
use tracing::{debug, error, trace};

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    /// Track of the current session
    pub track: Option<TrackDescriptor>,
    /// Generation of the current session (0 before the first track)
    pub generation: u64,
    pub strategy: Option<PlayStrategy>,
    pub phase: BufferingPhase,
    /// Seconds
    pub position: f64,
    /// Seconds, once known
    pub duration: Option<f64>,
    pub is_playing: bool,
    pub volume_percent: f64,
    /// Buffered payload installed
    pub upgraded: bool,
    /// Background download failed; progressive playback continues
    pub download_failed: bool,
    pub seekable: Vec<TimeRange>,
    pub buffered: Vec<TimeRange>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            track: None,
            generation: 0,
            strategy: None,
            phase: BufferingPhase::Idle,
            position: 0.0,
            duration: None,
            is_playing: false,
            volume_percent: 100.0,
            upgraded: false,
            download_failed: false,
            seekable: Vec::new(),
            buffered: Vec::new(),
        }
    }
}

impl EngineSnapshot {
    /// Share of the duration covered by the last buffered range, `0..=100`
    pub fn buffered_percent(&self) -> f64 {
        match (self.duration, self.buffered.last()) {
            (Some(duration), Some(range)) if duration > 0.0 => {
                (range.end / duration * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    /// Random access is available
    pub fn is_seekable(&self) -> bool {
        self.upgraded && !self.seekable.is_empty()
    }

    pub fn is_fully_buffered(&self) -> bool {
        self.phase == BufferingPhase::FullyBuffered
    }
}

impl EngineActor {
    pub(super) fn snapshot(&self) -> EngineSnapshot {
        let session = self.session.as_ref();
        EngineSnapshot {
            track: session.map(|s| s.track.clone()),
            generation: session.map_or(0, |s| s.generation),
            strategy: session.map(|s| s.strategy),
            phase: session.map_or(BufferingPhase::Idle, |s| s.phase()),
            position: session.map_or(0.0, |_| self.sink.position()),
            duration: session.and_then(|_| self.sink.duration()),
            is_playing: session.is_some() && !self.sink.is_paused(),
            volume_percent: self.volume_percent,
            upgraded: session.is_some_and(|s| s.is_upgraded()),
            download_failed: session.is_some_and(|s| s.download_failed),
            seekable: session.map(|_| self.sink.seekable()).unwrap_or_default(),
            buffered: session.map(|_| self.sink.buffered()).unwrap_or_default(),
        }
    }

    /// Publish the snapshot if anything changed
    pub(super) fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    /// Apply a sink notification if it belongs to the current session
    pub(super) fn handle_sink_message(&mut self, message: SinkMessage) {
        let current = self.session.as_ref().map_or(0, |s| s.generation);
        if message.epoch != current {
            trace!(
                "Discarding stale {:?} from session {}",
                message.event,
                message.epoch
            );
            return;
        }
        self.handle_sink_event(message.event);
    }

    /// Translate a sink notification into player events
    fn handle_sink_event(&mut self, event: SinkEvent) {
        let mapped = match event {
            SinkEvent::LoadStart => {
                debug!("Sink started loading a source");
                None
            }
            SinkEvent::LoadedMetadata => Some(PlayerEvent::Metadata),
            SinkEvent::DurationChange(duration) if duration.is_finite() && duration > 0.0 => {
                Some(PlayerEvent::Duration { duration })
            }
            SinkEvent::DurationChange(duration) => {
                debug!("Ignoring unusable duration {}", duration);
                None
            }
            SinkEvent::CanPlay => Some(PlayerEvent::CanPlay),
            SinkEvent::CanPlayThrough => Some(PlayerEvent::CanPlayThrough),
            SinkEvent::Play if self.quiet_resume => {
                debug!("Playback continued on the new source");
                None
            }
            SinkEvent::Playing if self.quiet_resume => {
                self.quiet_resume = false;
                None
            }
            SinkEvent::Play => Some(PlayerEvent::Play),
            SinkEvent::Playing => Some(PlayerEvent::Playing),
            SinkEvent::Pause => {
                self.quiet_resume = false;
                Some(PlayerEvent::Pause)
            }
            SinkEvent::Waiting => Some(PlayerEvent::Buffering),
            SinkEvent::TimeUpdate(position) => {
                if let Some(session) = self.session.as_mut() {
                    session.last_position = position;
                }
                Some(PlayerEvent::TimeUpdate { position })
            }
            SinkEvent::Progress => self.buffer_progress(),
            SinkEvent::Seeking(position) => Some(PlayerEvent::Seeking { position }),
            SinkEvent::Seeked(position) => Some(PlayerEvent::Seeked { position }),
            SinkEvent::Ended => {
                if let Some(session) = self.session.as_mut() {
                    session.play_intent = false;
                }
                Some(PlayerEvent::Ended)
            }
            SinkEvent::Error(message) => {
                error!("Audio sink error: {}", message);
                Some(PlayerEvent::error(ErrorKind::Sink, message))
            }
        };

        if let Some(event) = mapped {
            self.emit(event);
        }
    }

    /// `BufferProgress` for the sink's last buffered range, if the duration is known
    fn buffer_progress(&self) -> Option<PlayerEvent> {
        let duration = self.sink.duration().filter(|d| *d > 0.0)?;
        let buffered_end = self.sink.buffered().last()?.end;
        Some(PlayerEvent::BufferProgress {
            percent: (buffered_end / duration * 100.0).clamp(0.0, 100.0),
            buffered_end,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_percent() {
        let mut snapshot = EngineSnapshot::default();
        assert_eq!(snapshot.buffered_percent(), 0.0);

        snapshot.duration = Some(200.0);
        snapshot.buffered = vec![TimeRange::new(0.0, 20.0), TimeRange::new(40.0, 50.0)];
        assert!((snapshot.buffered_percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_seekable_requires_upgrade() {
        let mut snapshot = EngineSnapshot {
            seekable: vec![TimeRange::new(0.0, 10.0)],
            ..EngineSnapshot::default()
        };
        assert!(!snapshot.is_seekable());

        snapshot.upgraded = true;
        snapshot.phase = BufferingPhase::FullyBuffered;
        assert!(snapshot.is_seekable());
        assert!(snapshot.is_fully_buffered());
    }
}
