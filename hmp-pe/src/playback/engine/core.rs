//! Core playback engine - handle, actor and lifecycle
//!
//! **Responsibilities:**
//! - `PlaybackEngine`: cloneable-by-Arc handle; every method is a message to the actor
//! - `EngineActor`: sole owner of the sink and the session
//! - Actor loop multiplexing commands, fetch completions and sink events
//!
//! All state changes run on the actor task, one message at a time. The
//! upgrade sequence is handled inside a single message, so a seek is applied
//! either before the swap or after it, never in between.
//!
//! Sources are loaded into the sink under the session generation. Fetch
//! completions and sink events tagged with any other generation are stale and
//! dropped.

use super::diagnostics::EngineSnapshot;
use crate::audio::{AudioSink, SharedAnalyser, SinkEventReceiver};
use crate::client::{ProgressiveStream, StreamClient};
use crate::config::{EngineConfig, PlayStrategy};
use crate::error::{Error, Result};
use crate::playback::session::{BufferedPayload, PlaybackSession};
use hmp_common::events::{EventBus, PlayerEvent};
use hmp_common::TrackDescriptor;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Pending commands before callers are back-pressured
const COMMAND_CAPACITY: usize = 64;

/// Requests from the handle to the actor
pub(super) enum Command {
    PlayTrack {
        track: TrackDescriptor,
        strategy: Option<PlayStrategy>,
        reply: oneshot::Sender<u64>,
    },
    Play {
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    TogglePlayPause {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Seek {
        position: f64,
        reply: oneshot::Sender<f64>,
    },
    SetVolume {
        percent: f64,
        reply: oneshot::Sender<f64>,
    },
    Analyser {
        reply: oneshot::Sender<SharedAnalyser>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
}

/// Completion of a fetch task, tagged with the session it belongs to
pub(super) struct FetchMessage {
    pub(super) generation: u64,
    pub(super) outcome: FetchOutcome,
}

pub(super) enum FetchOutcome {
    ProgressiveReady(ProgressiveStream),
    ProgressiveFailed(Error),
    /// Buffered response headers accepted; body draining
    DownloadAccepted { content_length: Option<u64> },
    DownloadComplete(BufferedPayload),
    DownloadFailed { accepted: bool, error: Error },
}

impl FetchOutcome {
    pub(super) fn name(&self) -> &'static str {
        match self {
            FetchOutcome::ProgressiveReady(_) => "progressive-ready",
            FetchOutcome::ProgressiveFailed(_) => "progressive-failed",
            FetchOutcome::DownloadAccepted { .. } => "download-accepted",
            FetchOutcome::DownloadComplete(_) => "download-complete",
            FetchOutcome::DownloadFailed { .. } => "download-failed",
        }
    }
}

/// Playback engine handle
///
/// Dropping the last handle shuts the actor down as if `destroy` was called.
pub struct PlaybackEngine {
    commands: mpsc::Sender<Command>,
    events: EventBus,
    snapshot: watch::Receiver<EngineSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    /// Start the engine actor (requires a tokio runtime)
    ///
    /// `sink_events` must be the receiving end of the channel `sink` reports on.
    pub fn new<S: AudioSink>(
        sink: S,
        sink_events: SinkEventReceiver,
        client: Arc<dyn StreamClient>,
        config: EngineConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);

        let volume_percent = f64::from(sink.gain()) * 100.0;
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot {
            volume_percent,
            ..EngineSnapshot::default()
        });

        info!(
            "Starting playback engine (backend {}, strategy {})",
            config.backend_url, config.strategy
        );

        let actor = EngineActor {
            sink: Box::new(sink),
            client,
            config,
            events: events.clone(),
            snapshot_tx,
            session: None,
            generation: 0,
            volume_percent,
            analyser: None,
            fetch_tx,
            quiet_resume: false,
            destroyed: false,
        };
        let task = tokio::spawn(actor.run(command_rx, sink_events, fetch_rx));

        Self {
            commands: command_tx,
            events,
            snapshot: snapshot_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Latest published state
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }

    /// Start `track` with the configured strategy
    ///
    /// Returns as soon as the session exists and both requests are under way.
    /// The returned generation identifies the session in snapshots.
    pub async fn play_track(&self, track: TrackDescriptor) -> Result<u64> {
        self.request(|reply| Command::PlayTrack {
            track,
            strategy: None,
            reply,
        })
        .await
    }

    /// Start `track` with an explicit strategy
    pub async fn play_track_with(
        &self,
        track: TrackDescriptor,
        strategy: PlayStrategy,
    ) -> Result<u64> {
        self.request(|reply| Command::PlayTrack {
            track,
            strategy: Some(strategy),
            reply,
        })
        .await
    }

    /// Resume playback; no-op without a session
    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await?
    }

    /// Pause playback; no-op without a session
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.request(|reply| Command::TogglePlayPause { reply }).await?
    }

    /// Pause and rewind to the start
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Seek to `time` seconds; returns the position actually applied
    pub async fn seek(&self, time: f64) -> Result<f64> {
        self.request(|reply| Command::Seek {
            position: time,
            reply,
        })
        .await
    }

    /// Set volume in percent; out-of-range values are clamped to `[0, 100]`.
    /// Returns the applied percentage.
    pub async fn set_volume(&self, percent: f64) -> Result<f64> {
        self.request(|reply| Command::SetVolume { percent, reply })
            .await
    }

    /// Spectrum analyser attached to the sink, created on first use
    pub async fn analyser(&self) -> Result<SharedAnalyser> {
        self.request(|reply| Command::Analyser { reply }).await
    }

    /// Release every held resource and stop the actor; idempotent
    pub async fn destroy(&self) -> Result<()> {
        match self.request(|reply| Command::Destroy { reply }).await {
            Ok(()) | Err(Error::EngineStopped) => {}
            Err(e) => return Err(e),
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::EngineStopped)?;
        response.await.map_err(|_| Error::EngineStopped)
    }
}

/// Owner of the sink and the session
pub(super) struct EngineActor {
    pub(super) sink: Box<dyn AudioSink>,
    pub(super) client: Arc<dyn StreamClient>,
    pub(super) config: EngineConfig,
    pub(super) events: EventBus,
    pub(super) snapshot_tx: watch::Sender<EngineSnapshot>,
    pub(super) session: Option<PlaybackSession>,
    /// Last generation handed out
    pub(super) generation: u64,
    pub(super) volume_percent: f64,
    pub(super) analyser: Option<SharedAnalyser>,
    pub(super) fetch_tx: mpsc::UnboundedSender<FetchMessage>,
    /// Swallow the sink's next `Play`/`Playing`: playback resumed across a source swap
    pub(super) quiet_resume: bool,
    pub(super) destroyed: bool,
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut sink_events: SinkEventReceiver,
        mut fetches: mpsc::UnboundedReceiver<FetchMessage>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("All engine handles dropped");
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Some(message) = fetches.recv() => self.handle_fetch(message).await,
                Some(message) = sink_events.recv() => self.handle_sink_message(message),
            }
            self.publish();
        }

        self.shutdown();
        self.publish();
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::PlayTrack {
                track,
                strategy,
                reply,
            } => {
                let strategy = strategy.unwrap_or(self.config.strategy);
                let _ = reply.send(self.play_track(track, strategy));
            }
            Command::Play { reply } => {
                let _ = reply.send(self.resume().await);
            }
            Command::Pause { reply } => {
                self.pause();
                let _ = reply.send(());
            }
            Command::TogglePlayPause { reply } => {
                let result = if self.sink.is_paused() {
                    self.resume().await
                } else {
                    self.pause();
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            Command::Seek { position, reply } => {
                let _ = reply.send(self.seek(position));
            }
            Command::SetVolume { percent, reply } => {
                let _ = reply.send(self.set_volume(percent));
            }
            Command::Analyser { reply } => {
                let _ = reply.send(self.analyser());
            }
            Command::Destroy { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Deliver an event to subscribers
    pub(super) fn emit(&self, event: PlayerEvent) {
        if event.is_tick() {
            trace!("Event: {:?}", event);
        } else {
            debug!("Event: {}", event.name());
        }
        self.events.emit_lossy(event);
    }

    /// Release everything; safe to call more than once
    pub(super) fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(mut session) = self.session.take() {
            session.abort_tasks();
        }
        self.sink.pause();
        self.sink.unload();
        if self.analyser.take().is_some() {
            self.sink.detach_analyser();
        }
        info!("Playback engine destroyed");
    }
}
