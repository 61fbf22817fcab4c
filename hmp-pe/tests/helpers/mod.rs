//! Test infrastructure for hmp-pe integration tests
//!
//! - `MockSink`: scripted audio sink recording every call
//! - `MockStreamClient`: delivery endpoint stand-in whose responses are held
//!   back by gates, so tests decide when each fetch completes
//! - `EventLog`: event subscriber with timeouts

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hmp_common::events::{BufferingPhase, PlayerEvent};
use hmp_common::{TrackDescriptor, TrackSource};
use hmp_pe::audio::{
    sink_event_channel, AudioSink, SharedAnalyser, SinkEvent, SinkEventSender, SinkMessage,
    SinkSource, TimeRange,
};
use hmp_pe::client::{BufferedDownload, ProgressiveStream, StreamClient};
use hmp_pe::config::{EngineConfig, PlayStrategy};
use hmp_pe::{EngineSnapshot, Error, PlaybackEngine, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Duration the mock sink reports for buffered payloads
pub const BUFFERED_DURATION: f64 = 120.0;

pub fn track(id: &str) -> TrackDescriptor {
    TrackDescriptor {
        id: id.to_string(),
        title: format!("Track {}", id),
        artist: Some("Test Artist".to_string()),
        source: TrackSource::Youtube,
        url: Some(format!("https://youtube.com/watch?v={}", id)),
    }
}

pub fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

// ================================================================================================
// MockSink
// ================================================================================================

/// What the mock sink had installed
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    Progressive,
    Buffered(u64),
}

#[derive(Debug)]
pub struct SinkState {
    /// Epoch of the last load
    pub epoch: u64,
    pub loads: Vec<Loaded>,
    pub current: Option<Loaded>,
    pub unloads: usize,
    pub paused: bool,
    pub position: f64,
    pub positions_set: Vec<f64>,
    pub gain: f32,
    pub play_calls: usize,
    /// Reject every `play()`
    pub fail_play: bool,
    /// Seekable ranges reported while a progressive source is installed
    pub progressive_seekable: Vec<TimeRange>,
    pub analyser_attached: bool,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            epoch: 0,
            loads: Vec::new(),
            current: None,
            unloads: 0,
            paused: true,
            position: 0.0,
            positions_set: Vec::new(),
            gain: 1.0,
            play_calls: 0,
            fail_play: false,
            progressive_seekable: Vec::new(),
            analyser_attached: false,
        }
    }
}

/// Test-side handle on a [`MockSink`]
#[derive(Clone)]
pub struct SinkHandle {
    state: Arc<Mutex<SinkState>>,
    events: SinkEventSender,
}

impl SinkHandle {
    pub fn state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap()
    }

    /// Pretend playback advanced to `position`
    pub fn set_position(&self, position: f64) {
        self.state().position = position;
    }

    /// Report an event as if the sink produced it for the current load
    pub fn inject(&self, event: SinkEvent) {
        let epoch = self.state().epoch;
        self.events.send(SinkMessage { epoch, event }).unwrap();
    }

    pub fn last_load(&self) -> Option<Loaded> {
        self.state().loads.last().cloned()
    }
}

pub struct MockSink {
    state: Arc<Mutex<SinkState>>,
    events: SinkEventSender,
}

impl MockSink {
    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap()
    }

    fn emit(&self, event: SinkEvent) {
        let epoch = self.state().epoch;
        let _ = self.events.send(SinkMessage { epoch, event });
    }
}

#[async_trait]
impl AudioSink for MockSink {
    fn load(&mut self, epoch: u64, source: SinkSource) {
        let loaded = match &source {
            SinkSource::Progressive { .. } => Loaded::Progressive,
            SinkSource::Buffered(payload) => Loaded::Buffered(payload.len()),
        };
        {
            let mut state = self.state();
            state.epoch = epoch;
            state.loads.push(loaded.clone());
            state.current = Some(loaded.clone());
            state.paused = true;
            state.position = 0.0;
        }

        self.emit(SinkEvent::LoadStart);
        self.emit(SinkEvent::LoadedMetadata);
        if let Loaded::Buffered(_) = loaded {
            self.emit(SinkEvent::DurationChange(BUFFERED_DURATION));
            self.emit(SinkEvent::Progress);
        }
        self.emit(SinkEvent::CanPlay);
    }

    fn unload(&mut self) {
        let mut state = self.state();
        state.current = None;
        state.unloads += 1;
        state.paused = true;
    }

    async fn play(&mut self) -> Result<()> {
        {
            let mut state = self.state();
            state.play_calls += 1;
            if state.fail_play {
                return Err(Error::Sink("play() rejected".to_string()));
            }
            if state.current.is_none() {
                return Err(Error::Sink("No source".to_string()));
            }
            state.paused = false;
        }
        self.emit(SinkEvent::Play);
        self.emit(SinkEvent::Playing);
        Ok(())
    }

    fn pause(&mut self) {
        let was_playing = {
            let mut state = self.state();
            let was_playing = !state.paused;
            state.paused = true;
            was_playing
        };
        if was_playing {
            self.emit(SinkEvent::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn position(&self) -> f64 {
        self.state().position
    }

    fn set_position(&mut self, seconds: f64) {
        let mut state = self.state();
        state.position = seconds;
        state.positions_set.push(seconds);
    }

    fn duration(&self) -> Option<f64> {
        match self.state().current {
            Some(Loaded::Buffered(_)) => Some(BUFFERED_DURATION),
            _ => None,
        }
    }

    fn seekable(&self) -> Vec<TimeRange> {
        let state = self.state();
        match state.current {
            Some(Loaded::Buffered(_)) => vec![TimeRange::new(0.0, BUFFERED_DURATION)],
            Some(Loaded::Progressive) => state.progressive_seekable.clone(),
            None => Vec::new(),
        }
    }

    fn buffered(&self) -> Vec<TimeRange> {
        match self.state().current {
            Some(Loaded::Buffered(_)) => vec![TimeRange::new(0.0, BUFFERED_DURATION)],
            _ => Vec::new(),
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.state().gain = gain;
    }

    fn gain(&self) -> f32 {
        self.state().gain
    }

    fn attach_analyser(&mut self, _analyser: SharedAnalyser) {
        self.state().analyser_attached = true;
    }

    fn detach_analyser(&mut self) {
        self.state().analyser_attached = false;
    }
}

// ================================================================================================
// MockStreamClient
// ================================================================================================

/// Held-back completion; opening is permanent
#[derive(Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn closed() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn opened() -> Self {
        let gate = Self::closed();
        gate.open();
        gate
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// How one request of a script ends
#[derive(Clone)]
pub enum Outcome {
    Deliver(Bytes),
    /// Resolver found nothing (404)
    NotFound,
    /// Request failed before headers
    Fail,
    /// Headers accepted, body breaks
    BrokenBody,
}

/// Scripted responses for one track id
#[derive(Clone)]
pub struct TrackScript {
    pub progressive: Outcome,
    pub progressive_gate: Gate,
    pub buffered: Outcome,
    /// Before the buffered response headers
    pub headers_gate: Gate,
    /// Before the buffered body completes
    pub body_gate: Gate,
}

impl TrackScript {
    /// Every response is released immediately
    pub fn ready(bytes: Bytes) -> Self {
        Self {
            progressive: Outcome::Deliver(bytes.clone()),
            progressive_gate: Gate::opened(),
            buffered: Outcome::Deliver(bytes),
            headers_gate: Gate::opened(),
            body_gate: Gate::opened(),
        }
    }

    /// Nothing is released until the test opens the gates
    pub fn gated(bytes: Bytes) -> Self {
        Self {
            progressive: Outcome::Deliver(bytes.clone()),
            progressive_gate: Gate::closed(),
            buffered: Outcome::Deliver(bytes),
            headers_gate: Gate::closed(),
            body_gate: Gate::closed(),
        }
    }

    pub fn release_download(&self) {
        self.headers_gate.open();
        self.body_gate.open();
    }
}

#[derive(Default)]
pub struct MockStreamClient {
    scripts: Mutex<HashMap<String, TrackScript>>,
    requests: Mutex<Vec<(&'static str, String)>>,
}

impl MockStreamClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, id: &str, script: TrackScript) -> TrackScript {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), script.clone());
        script
    }

    /// `(mode, track id)` of every request issued
    pub fn requests(&self) -> Vec<(&'static str, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, mode: &str) -> usize {
        self.requests().iter().filter(|(m, _)| *m == mode).count()
    }

    fn lookup(&self, mode: &'static str, track: &TrackDescriptor) -> Option<TrackScript> {
        self.requests
            .lock()
            .unwrap()
            .push((mode, track.id.clone()));
        self.scripts.lock().unwrap().get(&track.id).cloned()
    }
}

fn failure(outcome: &Outcome) -> Option<Error> {
    match outcome {
        Outcome::NotFound => Some(Error::Resolution("Stream not found".to_string())),
        Outcome::Fail => Some(Error::Transfer("connection reset".to_string())),
        _ => None,
    }
}

#[async_trait]
impl StreamClient for MockStreamClient {
    async fn open_progressive(&self, track: &TrackDescriptor) -> Result<ProgressiveStream> {
        let Some(script) = self.lookup("progressive", track) else {
            return Err(Error::Resolution("Stream not found".to_string()));
        };
        script.progressive_gate.wait().await;

        if let Some(error) = failure(&script.progressive) {
            return Err(error);
        }
        let bytes = match script.progressive {
            Outcome::Deliver(bytes) => bytes,
            _ => Bytes::new(),
        };
        Ok(ProgressiveStream {
            content_type: "audio/webm".to_string(),
            body: hmp_common::stream::boxed(futures::stream::iter(vec![Ok(bytes)])),
        })
    }

    async fn open_buffered(&self, track: &TrackDescriptor) -> Result<BufferedDownload> {
        let Some(script) = self.lookup("buffered", track) else {
            return Err(Error::Resolution("Stream not found".to_string()));
        };
        script.headers_gate.wait().await;

        if let Some(error) = failure(&script.buffered) {
            return Err(error);
        }
        let gate = script.body_gate.clone();
        let (length, chunk) = match script.buffered {
            Outcome::Deliver(bytes) => (bytes.len() as u64, Ok(bytes)),
            _ => (
                1000,
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )),
            ),
        };

        let body = futures::stream::once(async move {
            gate.wait().await;
            chunk
        });
        Ok(BufferedDownload {
            content_type: "audio/webm".to_string(),
            content_length: Some(length),
            body: hmp_common::stream::boxed(body),
        })
    }
}

// ================================================================================================
// Engine and events
// ================================================================================================

pub fn config(strategy: PlayStrategy) -> EngineConfig {
    EngineConfig {
        backend_url: "http://delivery.test".to_string(),
        strategy,
        time_update_interval: Duration::from_millis(50),
        event_capacity: 256,
    }
}

/// Engine wired to a mock sink and `client`
pub fn engine(client: Arc<MockStreamClient>, strategy: PlayStrategy) -> (PlaybackEngine, SinkHandle) {
    let (events, receiver) = sink_event_channel();
    let state = Arc::new(Mutex::new(SinkState::default()));
    let sink = MockSink {
        state: Arc::clone(&state),
        events: events.clone(),
    };
    let handle = SinkHandle { state, events };

    let engine = PlaybackEngine::new(sink, receiver, client, config(strategy));
    (engine, handle)
}

/// Subscriber that remembers everything it has seen
pub struct EventLog {
    rx: broadcast::Receiver<PlayerEvent>,
    pub seen: Vec<PlayerEvent>,
}

impl EventLog {
    pub fn new(rx: broadcast::Receiver<PlayerEvent>) -> Self {
        Self {
            rx,
            seen: Vec::new(),
        }
    }

    /// Next event matching `pred`; panics after [`WAIT`]
    pub async fn wait_for(&mut self, pred: impl Fn(&PlayerEvent) -> bool) -> PlayerEvent {
        let rx = &mut self.rx;
        let seen = &mut self.seen;
        tokio::time::timeout(WAIT, async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        seen.push(event.clone());
                        if pred(&event) {
                            return event;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    pub async fn wait_for_name(&mut self, name: &str) -> PlayerEvent {
        self.wait_for(|e| e.name() == name).await
    }

    /// Like `wait_for_name`, but satisfied by an event already seen
    pub async fn ensure_seen(&mut self, name: &str) {
        if self.position_of(name).is_none() {
            self.wait_for_name(name).await;
        }
    }

    /// Collect whatever is queued right now
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.seen.push(event);
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.seen.iter().filter(|e| e.name() == name).count()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.seen.iter().position(|e| e.name() == name)
    }

    pub fn phases(&self) -> Vec<BufferingPhase> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::PhaseChanged { phase } => Some(*phase),
                _ => None,
            })
            .collect()
    }
}

/// Wait until the published snapshot satisfies `pred`
pub async fn wait_for_snapshot(
    engine: &PlaybackEngine,
    pred: impl Fn(&EngineSnapshot) -> bool,
) -> EngineSnapshot {
    let mut rx = engine.watch();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("engine stopped");
    snapshot.clone()
}

/// Poll `cond` until it holds; panics after [`WAIT`]
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Give the engine time to process anything already queued
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
