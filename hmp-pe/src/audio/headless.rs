//! Headless reference sink
//!
//! Plays nothing audible. It consumes sources the way a media element would
//! and keeps a wall-clock playback position, which is enough to drive the
//! engine end to end (CLI, integration tests):
//! - progressive sources are drained in a background task; length and
//!   duration stay unknown and nothing is seekable
//! - buffered payloads are probed for their duration and are seekable over
//!   `[0, duration]`
//! - a ticker reports `TimeUpdate` while playing, then `Pause` + `Ended` at
//!   the end of a buffered payload
//!
//! Background tasks tag their events with the epoch they were started under,
//! so a late `Ended` or `Error` is attributable to the load that produced it.

use super::analyser::SharedAnalyser;
use super::probe::{self, DecodedPcm};
use super::sink::{AudioSink, SinkEvent, SinkEventSender, SinkMessage, SinkSource, TimeRange};
use crate::error::{Error, Result};
use crate::playback::session::BufferedPayload;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Emit a `Progress` event every this many progressive bytes
const PROGRESS_STEP_BYTES: u64 = 64 * 1024;

/// Position bookkeeping shared with the ticker
#[derive(Debug, Default)]
struct Clock {
    /// Position when the clock was last started, stopped or moved
    base: f64,
    /// Set while playing
    started: Option<Instant>,
    duration: Option<f64>,
}

impl Clock {
    fn position(&self) -> f64 {
        let elapsed = self.started.map_or(0.0, |s| s.elapsed().as_secs_f64());
        let position = self.base + elapsed;
        self.duration.map_or(position, |d| position.min(d))
    }

    fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        self.base = self.position();
        self.started = None;
    }

    fn seek(&mut self, position: f64) {
        self.base = position;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn is_running(&self) -> bool {
        self.started.is_some()
    }
}

#[derive(Default)]
struct Shared {
    /// Epoch of the current load
    epoch: u64,
    clock: Clock,
    pcm: Option<Arc<DecodedPcm>>,
    analyser: Option<SharedAnalyser>,
}

enum Loaded {
    Empty,
    Progressive {
        received: Arc<AtomicU64>,
        drain: JoinHandle<()>,
    },
    Buffered(BufferedPayload),
}

/// Sink without an output device
pub struct HeadlessSink {
    events: SinkEventSender,
    shared: Arc<Mutex<Shared>>,
    loaded: Loaded,
    gain: f32,
    ticker: JoinHandle<()>,
    decode: Option<JoinHandle<()>>,
}

impl HeadlessSink {
    /// Create the sink and start its ticker (requires a tokio runtime)
    pub fn new(events: SinkEventSender, tick_interval: Duration) -> Self {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let ticker = tokio::spawn(run_ticker(
            Arc::clone(&shared),
            events.clone(),
            tick_interval,
        ));

        Self {
            events,
            shared,
            loaded: Loaded::Empty,
            gain: 1.0,
            ticker,
            decode: None,
        }
    }

    /// Bytes of the progressive source received so far
    pub fn progressive_bytes(&self) -> Option<u64> {
        match &self.loaded {
            Loaded::Progressive { received, .. } => Some(received.load(Ordering::Relaxed)),
            _ => None,
        }
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    fn emit(&self, event: SinkEvent) {
        let epoch = self.state().epoch;
        let _ = self.events.send(SinkMessage { epoch, event });
    }

    fn release(&mut self) {
        if let Loaded::Progressive { drain, .. } = &self.loaded {
            drain.abort();
        }
        if let Some(decode) = self.decode.take() {
            decode.abort();
        }
        self.loaded = Loaded::Empty;

        let mut state = self.state();
        state.clock = Clock::default();
        state.pcm = None;
        if let Some(analyser) = &state.analyser {
            lock(analyser).reset();
        }
    }

    /// Decode the buffered payload for the analyser, off the runtime threads
    fn start_decode(&mut self) {
        let Loaded::Buffered(payload) = &self.loaded else {
            return;
        };
        if self.state().analyser.is_none() || self.decode.is_some() {
            return;
        }

        let bytes = payload.bytes().clone();
        let shared = Arc::clone(&self.shared);
        self.decode = Some(tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || probe::decode_mono(&bytes)).await {
                Ok(Ok(pcm)) => lock(&shared).pcm = Some(Arc::new(pcm)),
                Ok(Err(e)) => debug!("No PCM for analyser: {}", e),
                Err(e) => warn!("Decode task failed: {}", e),
            }
        }));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AudioSink for HeadlessSink {
    fn load(&mut self, epoch: u64, source: SinkSource) {
        self.release();
        self.state().epoch = epoch;
        self.emit(SinkEvent::LoadStart);

        match source {
            SinkSource::Progressive {
                content_type,
                stream,
            } => {
                debug!("Loading progressive source ({})", content_type);
                let received = Arc::new(AtomicU64::new(0));
                let drain = tokio::spawn(drain_progressive(
                    stream,
                    Arc::clone(&received),
                    self.events.clone(),
                    epoch,
                ));
                self.loaded = Loaded::Progressive { received, drain };
            }
            SinkSource::Buffered(payload) => {
                let duration = match probe::probe_duration(payload.bytes()) {
                    Ok(duration) => Some(duration),
                    Err(e) => {
                        warn!("Could not determine duration of buffered payload: {}", e);
                        None
                    }
                };
                info!(
                    "Loaded buffered payload: {} bytes, duration {:?}",
                    payload.len(),
                    duration
                );

                self.state().clock.duration = duration;
                self.loaded = Loaded::Buffered(payload);

                self.emit(SinkEvent::LoadedMetadata);
                if let Some(duration) = duration {
                    self.emit(SinkEvent::DurationChange(duration));
                }
                self.emit(SinkEvent::Progress);
                self.emit(SinkEvent::CanPlay);
                self.emit(SinkEvent::CanPlayThrough);
                self.start_decode();
            }
        }
    }

    fn unload(&mut self) {
        let was_playing = !self.is_paused();
        self.release();
        if was_playing {
            self.emit(SinkEvent::Pause);
        }
    }

    async fn play(&mut self) -> Result<()> {
        if matches!(self.loaded, Loaded::Empty) {
            return Err(Error::Sink("No source loaded".to_string()));
        }

        let started = {
            let mut state = self.state();
            if state.clock.is_running() {
                false
            } else {
                // Playing again after the end restarts from the beginning
                if state.clock.duration.is_some_and(|d| state.clock.base >= d) {
                    state.clock.base = 0.0;
                }
                state.clock.start();
                true
            }
        };

        if started {
            self.emit(SinkEvent::Play);
            self.emit(SinkEvent::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) {
        let stopped = {
            let mut state = self.state();
            let running = state.clock.is_running();
            state.clock.stop();
            running
        };
        if stopped {
            self.emit(SinkEvent::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        !self.state().clock.is_running()
    }

    fn position(&self) -> f64 {
        self.state().clock.position()
    }

    fn set_position(&mut self, seconds: f64) {
        let target = {
            let mut state = self.state();
            let target = match state.clock.duration {
                Some(duration) => seconds.clamp(0.0, duration),
                None => seconds.max(0.0),
            };
            state.clock.seek(target);
            target
        };
        self.emit(SinkEvent::Seeking(target));
        self.emit(SinkEvent::Seeked(target));
    }

    fn duration(&self) -> Option<f64> {
        self.state().clock.duration
    }

    fn seekable(&self) -> Vec<TimeRange> {
        match (&self.loaded, self.duration()) {
            (Loaded::Buffered(_), Some(duration)) => vec![TimeRange::new(0.0, duration)],
            _ => Vec::new(),
        }
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.seekable()
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    fn gain(&self) -> f32 {
        self.gain
    }

    fn attach_analyser(&mut self, analyser: SharedAnalyser) {
        self.state().analyser = Some(analyser);
        self.start_decode();
    }

    fn detach_analyser(&mut self) {
        self.state().analyser = None;
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        self.ticker.abort();
        self.release();
    }
}

async fn drain_progressive(
    mut stream: hmp_common::ByteStream,
    received: Arc<AtomicU64>,
    events: SinkEventSender,
    epoch: u64,
) {
    let send = |event| {
        let _ = events.send(SinkMessage { epoch, event });
    };
    let mut next_progress = 0u64;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                let total = received.fetch_add(bytes.len() as u64, Ordering::Relaxed)
                    + bytes.len() as u64;
                if next_progress == 0 {
                    send(SinkEvent::LoadedMetadata);
                    send(SinkEvent::CanPlay);
                }
                if total >= next_progress {
                    send(SinkEvent::Progress);
                    next_progress = total + PROGRESS_STEP_BYTES;
                }
            }
            Err(e) => {
                warn!("Progressive source failed: {}", e);
                send(SinkEvent::Error(format!("Network error: {}", e)));
                return;
            }
        }
    }

    debug!(
        "Progressive source complete ({} bytes)",
        received.load(Ordering::Relaxed)
    );
    send(SinkEvent::CanPlayThrough);
}

async fn run_ticker(shared: Arc<Mutex<Shared>>, events: SinkEventSender, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let (epoch, position, ended) = {
            let mut state = lock(&shared);
            if !state.clock.is_running() {
                continue;
            }
            let position = state.clock.position();

            if let (Some(pcm), Some(analyser)) = (&state.pcm, &state.analyser) {
                let mut analyser = lock(analyser);
                let len = analyser.fft_size();
                analyser.push_samples(pcm.window_at(position, len));
            }

            let ended = state.clock.duration.is_some_and(|d| position >= d);
            if ended {
                state.clock.stop();
            }
            (state.epoch, position, ended)
        };

        let send = |event| events.send(SinkMessage { epoch, event });
        if send(SinkEvent::TimeUpdate(position)).is_err() {
            break;
        }
        if ended {
            let _ = send(SinkEvent::Pause);
            let _ = send(SinkEvent::Ended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::sink_event_channel;
    use bytes::Bytes;

    fn wav(seconds: f32) -> BufferedPayload {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(seconds * 8000.0) as usize {
                writer.write_sample(((i % 64) as i16 - 32) * 256).unwrap();
            }
            writer.finalize().unwrap();
        }
        BufferedPayload::new(Bytes::from(cursor.into_inner()))
    }

    fn drain(rx: &mut crate::audio::sink::SinkEventReceiver) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(message.event);
        }
        events
    }

    #[tokio::test]
    async fn test_buffered_load_reports_duration_and_seekable() {
        let (tx, mut rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));

        sink.load(1, SinkSource::Buffered(wav(2.0)));

        let duration = sink.duration().unwrap();
        assert!((duration - 2.0).abs() < 0.01);
        assert_eq!(sink.seekable(), vec![TimeRange::new(0.0, duration)]);
        assert!(sink.is_paused());

        let events = drain(&mut rx);
        assert_eq!(events[0], SinkEvent::LoadStart);
        assert!(events.contains(&SinkEvent::CanPlay));
        assert!(events.iter().any(|e| matches!(e, SinkEvent::DurationChange(_))));
    }

    #[tokio::test]
    async fn test_play_without_source_fails() {
        let (tx, _rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));

        assert!(matches!(sink.play().await, Err(Error::Sink(_))));
        assert!(sink.is_paused());
    }

    #[tokio::test]
    async fn test_set_position_clamped_to_duration() {
        let (tx, _rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));
        sink.load(1, SinkSource::Buffered(wav(1.0)));

        sink.set_position(50.0);
        assert!((sink.position() - 1.0).abs() < 0.01);

        sink.set_position(-3.0);
        assert_eq!(sink.position(), 0.0);
    }

    #[tokio::test]
    async fn test_plays_to_end() {
        let (tx, mut rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));
        sink.load(1, SinkSource::Buffered(wav(0.2)));
        sink.play().await.unwrap();

        let ended = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(message) = rx.recv().await {
                if message.event == SinkEvent::Ended {
                    assert_eq!(message.epoch, 1);
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();

        assert!(ended);
        assert!(sink.is_paused());
    }

    #[tokio::test]
    async fn test_progressive_source_is_drained_and_released() {
        let (tx, mut rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));

        let stream = hmp_common::stream::boxed(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defg")),
        ]));
        sink.load(
            4,
            SinkSource::Progressive {
                content_type: "audio/webm".to_string(),
                stream,
            },
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(message) = rx.recv().await {
                assert_eq!(message.epoch, 4);
                if message.event == SinkEvent::CanPlayThrough {
                    break;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(sink.progressive_bytes(), Some(7));
        assert!(sink.duration().is_none());
        assert!(sink.seekable().is_empty());

        sink.unload();
        assert_eq!(sink.progressive_bytes(), None);
    }

    #[tokio::test]
    async fn test_reload_retags_events() {
        let (tx, mut rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));

        let broken = hmp_common::stream::boxed(futures::stream::iter(vec![Err(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        )]));
        sink.load(
            1,
            SinkSource::Progressive {
                content_type: "audio/webm".to_string(),
                stream: broken,
            },
        );
        let error = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(message) if matches!(message.event, SinkEvent::Error(_)) => break message,
                    Some(_) => continue,
                    None => panic!("sink channel closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(error.epoch, 1);

        sink.load(2, SinkSource::Buffered(wav(0.5)));
        let messages: Vec<SinkMessage> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(!messages.is_empty());
        assert!(messages.iter().all(|m| m.epoch == 2));
    }

    #[tokio::test]
    async fn test_gain_clamped() {
        let (tx, _rx) = sink_event_channel();
        let mut sink = HeadlessSink::new(tx, Duration::from_millis(10));

        sink.set_gain(3.0);
        assert_eq!(sink.gain(), 1.0);
        sink.set_gain(-1.0);
        assert_eq!(sink.gain(), 0.0);
    }
}
