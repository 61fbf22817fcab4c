//! Playback operations on the engine actor
//!
//! Track start, fetch completions (including the progressive → buffered
//! upgrade), transport, seek and volume.

use super::core::{EngineActor, FetchMessage, FetchOutcome};
use crate::audio::{SharedAnalyser, SinkSource, SpectrumAnalyser};
use crate::client::ProgressiveStream;
use crate::config::PlayStrategy;
use crate::error::{Error, Result};
use crate::playback::session::{BufferedPayload, PlaybackSession};
use hmp_common::events::{BufferingPhase, PlaybackMode, PlayerEvent};
use hmp_common::TrackDescriptor;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shown when the user seeks before the payload is fully buffered
pub const SEEK_WHILE_LOADING: &str = "Stream is still loading, seeking may not work smoothly";

impl EngineActor {
    /// Replace the current session with one for `track`
    ///
    /// Returns the new session's generation.
    pub(super) fn play_track(&mut self, track: TrackDescriptor, strategy: PlayStrategy) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        info!(
            "Playing {} ({}) with {} strategy, session {}",
            track.display_name(),
            track.id,
            strategy,
            generation
        );

        // New session goes in before the previous one is released, so
        // anything the old source still reports is already stale
        let was_playing = !self.sink.is_paused();
        let previous = self
            .session
            .replace(PlaybackSession::new(generation, track.clone(), strategy));
        self.sink.unload();
        self.quiet_resume = false;
        if let Some(previous) = previous {
            debug!("Released session {}", previous.generation);
        }
        if was_playing {
            self.emit(PlayerEvent::Pause);
        }

        self.emit(PlayerEvent::PhaseChanged {
            phase: BufferingPhase::Idle,
        });
        self.emit(PlayerEvent::Loading);

        if strategy.uses_progressive() {
            self.advance_phase(BufferingPhase::ProgressiveOnly);
            let task = self.spawn_progressive(generation, track.clone());
            self.track_task(task);
        }

        if strategy.uses_buffered() {
            self.emit(PlayerEvent::DownloadStarted);
            let task = self.spawn_download(generation, track);
            self.track_task(task);
        }

        generation
    }

    fn track_task(&mut self, task: JoinHandle<()>) {
        match self.session.as_mut() {
            Some(session) => session.track_task(task),
            None => task.abort(),
        }
    }

    fn spawn_progressive(&self, generation: u64, track: TrackDescriptor) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let fetches = self.fetch_tx.clone();

        tokio::spawn(async move {
            let outcome = match client.open_progressive(&track).await {
                Ok(stream) => FetchOutcome::ProgressiveReady(stream),
                Err(e) => FetchOutcome::ProgressiveFailed(e),
            };
            let _ = fetches.send(FetchMessage {
                generation,
                outcome,
            });
        })
    }

    fn spawn_download(&self, generation: u64, track: TrackDescriptor) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let fetches = self.fetch_tx.clone();

        tokio::spawn(async move {
            let send = |outcome| {
                let _ = fetches.send(FetchMessage {
                    generation,
                    outcome,
                });
            };

            let download = match client.open_buffered(&track).await {
                Ok(download) => download,
                Err(error) => {
                    send(FetchOutcome::DownloadFailed {
                        accepted: false,
                        error,
                    });
                    return;
                }
            };

            send(FetchOutcome::DownloadAccepted {
                content_length: download.content_length,
            });

            match download.collect().await {
                Ok(payload) => send(FetchOutcome::DownloadComplete(payload)),
                Err(error) => send(FetchOutcome::DownloadFailed {
                    accepted: true,
                    error,
                }),
            }
        })
    }

    /// Apply a fetch completion if it belongs to the current session
    pub(super) async fn handle_fetch(&mut self, message: FetchMessage) {
        let current = self.session.as_ref().map(|s| s.generation);
        if current != Some(message.generation) {
            debug!(
                "Discarding stale {} from session {}",
                message.outcome.name(),
                message.generation
            );
            return;
        }

        match message.outcome {
            FetchOutcome::ProgressiveReady(stream) => self.on_progressive_ready(stream).await,
            FetchOutcome::ProgressiveFailed(error) => self.on_progressive_failed(error),
            FetchOutcome::DownloadAccepted { content_length } => {
                self.on_download_accepted(content_length)
            }
            FetchOutcome::DownloadComplete(payload) => self.upgrade(payload).await,
            FetchOutcome::DownloadFailed { accepted, error } => {
                self.on_download_failed(accepted, error)
            }
        }
    }

    async fn on_progressive_ready(&mut self, stream: ProgressiveStream) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_upgraded() {
            debug!("Progressive stream arrived after the upgrade; dropping it");
            return;
        }
        session.progressive_loaded = true;
        let generation = session.generation;
        let play_intent = session.play_intent;
        let track = session.track.clone();

        debug!("Progressive stream ready ({})", stream.content_type);
        self.sink.load(
            generation,
            SinkSource::Progressive {
                content_type: stream.content_type,
                stream: stream.body,
            },
        );

        if !play_intent {
            return;
        }
        match self.sink.play().await {
            Ok(()) => self.emit(PlayerEvent::Playback {
                track,
                mode: PlaybackMode::Progressive,
                timestamp: chrono::Utc::now(),
            }),
            Err(e) => {
                warn!("Progressive playback did not start: {}", e);
                self.emit(PlayerEvent::warning(format!(
                    "Playback did not start: {}",
                    e
                )));
            }
        }
    }

    fn on_progressive_failed(&mut self, error: Error) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.progressive_failed = true;
        let strategy = session.strategy;

        error!("Progressive stream failed: {}", error);
        self.emit(PlayerEvent::error(error.kind(), error.to_string()));
        if strategy.uses_buffered() {
            debug!("Full download still in flight; playback resumes on upgrade");
        }
    }

    fn on_download_accepted(&mut self, content_length: Option<u64>) {
        match content_length {
            Some(len) => debug!("Full download accepted ({} bytes)", len),
            None => debug!("Full download accepted (length unknown)"),
        }
        self.advance_phase(BufferingPhase::DownloadingFull);
    }

    /// Swap the sink to the buffered payload, keeping position and intent
    async fn upgrade(&mut self, payload: BufferedPayload) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.is_upgraded() {
            warn!("Session {} already upgraded", session.generation);
            return;
        }
        let generation = session.generation;
        let strategy = session.strategy;
        let play_intent = session.play_intent;
        let track = session.track.clone();
        let was_playing = !self.sink.is_paused();
        let position = if session.progressive_loaded {
            self.sink.position()
        } else {
            0.0
        };

        self.emit(PlayerEvent::DownloadFinished);
        info!(
            "Switching to buffered payload ({} bytes) at {:.2}s",
            payload.len(),
            position
        );

        self.sink.load(generation, SinkSource::Buffered(payload.clone()));
        if position > 0.0 {
            self.sink.set_position(position);
        }
        let restored = self.sink.position();

        let mut started = false;
        if play_intent {
            match self.sink.play().await {
                Ok(()) => started = true,
                Err(e) => {
                    warn!("Buffered playback did not start: {}", e);
                    self.emit(PlayerEvent::warning(format!(
                        "Playback did not start: {}",
                        e
                    )));
                }
            }
        }

        // Listeners saw one continuous play through the swap
        match (was_playing, started) {
            (true, true) => self.quiet_resume = true,
            (true, false) => self.emit(PlayerEvent::Pause),
            _ => {}
        }

        if let Some(session) = self.session.as_mut() {
            session.buffered = Some(payload);
            session.last_position = restored;
        }
        self.advance_phase(BufferingPhase::FullyBuffered);

        match strategy {
            PlayStrategy::Buffered => {
                if started {
                    self.emit(PlayerEvent::Playback {
                        track,
                        mode: PlaybackMode::Seekable,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            _ => self.emit(PlayerEvent::Upgraded {
                position: restored,
                timestamp: chrono::Utc::now(),
            }),
        }
    }

    fn on_download_failed(&mut self, accepted: bool, error: Error) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.download_failed = true;
        let strategy = session.strategy;

        match strategy {
            PlayStrategy::Buffered => {
                error!("Full download failed: {}", error);
                self.emit(PlayerEvent::error(error.kind(), error.to_string()));
            }
            _ => {
                warn!(
                    "Background buffering failed{}: {}",
                    if accepted { " mid-transfer" } else { "" },
                    error
                );
                self.emit(PlayerEvent::warning(format!(
                    "Background buffering failed: {}; continuing progressive playback",
                    error
                )));
            }
        }
    }

    /// Advance the session phase, announcing legal transitions
    fn advance_phase(&mut self, next: BufferingPhase) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.advance(next) {
            return false;
        }
        self.emit(PlayerEvent::PhaseChanged { phase: next });
        true
    }

    /// Resume; before any source is loaded only the intent is recorded
    pub(super) async fn resume(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            debug!("Play ignored: no active session");
            return Ok(());
        };
        session.play_intent = true;
        if !session.progressive_loaded && !session.is_upgraded() {
            debug!("Play requested before a source is loaded");
            return Ok(());
        }

        self.sink.play().await.map_err(|e| {
            warn!("Play rejected by the sink: {}", e);
            e
        })
    }

    pub(super) fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            debug!("Pause ignored: no active session");
            return;
        };
        session.play_intent = false;
        self.sink.pause();
    }

    pub(super) fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.play_intent = false;
        session.last_position = 0.0;
        self.sink.pause();
        self.sink.set_position(0.0);
    }

    /// Seek, returning the position handed to the sink
    ///
    /// Unrestricted (within the duration) once fully buffered; otherwise a
    /// `SeekWarning` is emitted and the target is clamped into what the sink
    /// reports as seekable.
    pub(super) fn seek(&mut self, time: f64) -> f64 {
        let Some(phase) = self.session.as_ref().map(|s| s.phase()) else {
            debug!("Seek ignored: no active session");
            return 0.0;
        };

        let duration = self.sink.duration().filter(|d| d.is_finite() && *d >= 0.0);
        let requested = if time.is_finite() {
            time
        } else if time > 0.0 {
            duration.unwrap_or(0.0)
        } else {
            0.0
        };

        let target = if phase.is_seekable() {
            match duration {
                Some(duration) => requested.clamp(0.0, duration),
                None => requested.max(0.0),
            }
        } else {
            warn!("Seek to {:.2}s while {}", requested, phase);
            self.emit(PlayerEvent::SeekWarning {
                message: SEEK_WHILE_LOADING.to_string(),
            });
            match self.sink.seekable().first() {
                Some(range) => range.clamp(requested),
                None => requested.max(0.0),
            }
        };

        self.sink.set_position(target);
        if let Some(session) = self.session.as_mut() {
            session.last_position = target;
        }
        target
    }

    /// Set volume in percent, returning the clamped value
    pub(super) fn set_volume(&mut self, percent: f64) -> f64 {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        self.volume_percent = percent;
        self.sink.set_gain((percent / 100.0) as f32);
        percent
    }

    pub(super) fn analyser(&mut self) -> SharedAnalyser {
        if let Some(analyser) = &self.analyser {
            return Arc::clone(analyser);
        }
        debug!("Creating spectrum analyser");
        let analyser = SpectrumAnalyser::shared();
        self.sink.attach_analyser(Arc::clone(&analyser));
        self.analyser = Some(Arc::clone(&analyser));
        analyser
    }
}
