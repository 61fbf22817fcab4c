//! Playback session: the state owned by the engine for one track

use crate::config::PlayStrategy;
use bytes::Bytes;
use hmp_common::events::BufferingPhase;
use hmp_common::TrackDescriptor;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Fully downloaded track held in memory
///
/// Cloning shares the same allocation; the bytes are freed when the last
/// clone (session or sink source) is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedPayload {
    bytes: Bytes,
}

impl BufferedPayload {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// State of one `play_track` call
///
/// Replaced wholesale when a new track starts. Dropping a session aborts its
/// fetch tasks and releases its buffered payload.
#[derive(Debug)]
pub struct PlaybackSession {
    /// Token distinguishing this session's fetch completions from stale ones
    pub generation: u64,
    pub track: TrackDescriptor,
    pub strategy: PlayStrategy,
    phase: BufferingPhase,
    /// Whether the user wants audio to be playing
    pub play_intent: bool,
    /// Last position reported by the sink (seconds)
    pub last_position: f64,
    /// Installed buffered payload, once the upgrade committed
    pub buffered: Option<BufferedPayload>,
    /// The progressive source has been loaded into the sink
    pub progressive_loaded: bool,
    pub progressive_failed: bool,
    pub download_failed: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl PlaybackSession {
    pub fn new(generation: u64, track: TrackDescriptor, strategy: PlayStrategy) -> Self {
        Self {
            generation,
            track,
            strategy,
            phase: BufferingPhase::Idle,
            play_intent: true,
            last_position: 0.0,
            buffered: None,
            progressive_loaded: false,
            progressive_failed: false,
            download_failed: false,
            tasks: Vec::new(),
        }
    }

    pub fn phase(&self) -> BufferingPhase {
        self.phase
    }

    /// Move forward to `next`; returns false (phase unchanged) for any
    /// transition that is not a legal forward step
    pub fn advance(&mut self, next: BufferingPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            warn!(
                "Session {}: rejected phase transition {} → {}",
                self.generation, self.phase, next
            );
            return false;
        }
        debug!("Session {}: {} → {}", self.generation, self.phase, next);
        self.phase = next;
        true
    }

    /// Whether the buffered payload has been installed
    pub fn is_upgraded(&self) -> bool {
        self.buffered.is_some()
    }

    /// Keep a fetch task so it can be abandoned with the session
    pub fn track_task(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }

    /// Abort all fetches still in flight
    pub fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmp_common::TrackSource;

    fn session() -> PlaybackSession {
        let track = TrackDescriptor {
            id: "t".to_string(),
            title: "T".to_string(),
            artist: None,
            source: TrackSource::Youtube,
            url: None,
        };
        PlaybackSession::new(1, track, PlayStrategy::Hybrid)
    }

    #[test]
    fn test_phase_only_moves_forward() {
        let mut session = session();
        assert_eq!(session.phase(), BufferingPhase::Idle);

        assert!(session.advance(BufferingPhase::ProgressiveOnly));
        assert!(!session.advance(BufferingPhase::Idle));
        assert!(!session.advance(BufferingPhase::FullyBuffered));
        assert!(session.advance(BufferingPhase::DownloadingFull));
        assert!(session.advance(BufferingPhase::FullyBuffered));
        assert!(!session.advance(BufferingPhase::ProgressiveOnly));

        assert_eq!(session.phase(), BufferingPhase::FullyBuffered);
    }

    #[tokio::test]
    async fn test_drop_aborts_tasks() {
        let mut session = session();
        let task = tokio::spawn(futures::future::pending::<()>());
        let abort = task.abort_handle();
        session.track_task(task);

        drop(session);
        for _ in 0..10 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(abort.is_finished());
    }

    #[test]
    fn test_payload_shares_bytes() {
        let payload = BufferedPayload::new(Bytes::from_static(b"abcd"));
        let copy = payload.clone();
        assert_eq!(copy.len(), 4);
        assert_eq!(copy.bytes().as_ptr(), payload.bytes().as_ptr());
    }
}
