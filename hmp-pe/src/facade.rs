//! Playback facade
//!
//! The consumer-facing adapter over [`PlaybackEngine`]: reduces the event
//! stream into a small observable state and forwards the handful of commands a
//! UI needs. UI code goes through the facade, never the engine directly.

use crate::error::Result;
use crate::playback::PlaybackEngine;
use hmp_common::events::PlayerEvent;
use hmp_common::TrackDescriptor;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Error text shown to the user for any playback error
pub const PLAYBACK_ERROR_MESSAGE: &str = "Playback error occurred";

/// UI-observable playback state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacadeState {
    pub is_playing: bool,
    /// Seconds
    pub current_time: f64,
    /// Seconds; 0 while unknown
    pub duration: f64,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl FacadeState {
    /// Fold one event into the state; returns whether anything changed
    pub fn apply(&mut self, event: &PlayerEvent) -> bool {
        let before = self.clone();
        match event {
            PlayerEvent::Play => self.is_playing = true,
            PlayerEvent::Pause => self.is_playing = false,
            PlayerEvent::TimeUpdate { position } => self.current_time = *position,
            PlayerEvent::Duration { duration } => self.duration = *duration,
            PlayerEvent::Loading => {
                // A new track is starting; earlier errors belonged to the previous one
                self.is_loading = true;
                self.error = None;
            }
            PlayerEvent::CanPlay => self.is_loading = false,
            PlayerEvent::Error { .. } => self.error = Some(PLAYBACK_ERROR_MESSAGE.to_string()),
            _ => {}
        }
        *self != before
    }
}

pub struct PlaybackFacade {
    engine: Arc<PlaybackEngine>,
    state_tx: Arc<watch::Sender<FacadeState>>,
    state: watch::Receiver<FacadeState>,
    reducer: JoinHandle<()>,
}

impl PlaybackFacade {
    /// Attach to `engine` (requires a tokio runtime)
    ///
    /// Only events emitted after this call are observed.
    pub fn new(engine: Arc<PlaybackEngine>) -> Self {
        let (state_tx, state) = watch::channel(FacadeState::default());
        let state_tx = Arc::new(state_tx);
        let reducer = tokio::spawn(reduce_events(engine.subscribe(), Arc::clone(&state_tx)));

        Self {
            engine,
            state_tx,
            state,
            reducer,
        }
    }

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    pub fn state(&self) -> FacadeState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<FacadeState> {
        self.state.clone()
    }

    /// Start `track`, clearing any previous error
    pub async fn play_track(&self, track: TrackDescriptor) -> Result<u64> {
        self.state_tx.send_if_modified(|state| state.error.take().is_some());
        self.engine.play_track(track).await
    }

    /// Pause when observed playing, resume otherwise
    pub async fn toggle_play_pause(&self) -> Result<()> {
        if self.state.borrow().is_playing {
            self.engine.pause().await
        } else {
            self.engine.play().await
        }
    }

    pub async fn seek(&self, time: f64) -> Result<f64> {
        self.engine.seek(time).await
    }

    pub async fn set_volume(&self, percent: f64) -> Result<f64> {
        self.engine.set_volume(percent).await
    }

    /// Stop observing and tear the engine down
    pub async fn destroy(&self) -> Result<()> {
        self.reducer.abort();
        self.engine.destroy().await
    }
}

impl Drop for PlaybackFacade {
    fn drop(&mut self) {
        self.reducer.abort();
    }
}

async fn reduce_events(
    events: broadcast::Receiver<PlayerEvent>,
    state: Arc<watch::Sender<FacadeState>>,
) {
    let mut events = BroadcastStream::new(events);
    while let Some(result) = events.next().await {
        match result {
            Ok(event) => {
                state.send_if_modified(|current| current.apply(&event));
            }
            Err(e) => {
                // Lagged; the next ticks bring the state back in line
                warn!("Facade fell behind the engine: {:?}", e);
            }
        }
    }
    debug!("Engine event stream closed");
}
