//! Test helpers for hmp-sd integration tests
//!
//! - MemoryResolver: scripted TrackResolver backed by in-memory bytes
//! - TestServer: in-process router driven with `tower::ServiceExt::oneshot`

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, Stream};
use hmp_common::{ByteStream, TrackDescriptor, TrackSource};
use hmp_sd::api::{create_router, AppContext};
use hmp_sd::resolver::{ResolvedStream, TrackResolver};
use hmp_sd::{Error, Result};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;

/// What the resolver does for every track
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Yield `bytes` in chunks of `chunk_size`
    Payload { bytes: Vec<u8>, chunk_size: usize },
    /// Resolve to nothing (404)
    Nothing,
    /// Fail resolution (500)
    Fail,
    /// Resolve, but the stream errors before its first byte
    BrokenAtStart,
    /// Yield `good_chunks` chunks, then an error
    BrokenAfter { good_chunks: usize },
    /// Never end
    Endless,
}

/// Scripted resolver recording calls and stream release
pub struct MemoryResolver {
    behaviour: Behaviour,
    pub calls: AtomicUsize,
    pub released: Arc<AtomicBool>,
}

impl MemoryResolver {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// `len` bytes of a recognizable pattern in 64-byte chunks
    pub fn with_payload(len: usize) -> Arc<Self> {
        Self::new(Behaviour::Payload {
            bytes: pattern(len),
            chunk_size: 64,
        })
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn stream(&self) -> ByteStream {
        let inner: ByteStream = match &self.behaviour {
            Behaviour::Payload { bytes, chunk_size } => {
                let chunks: Vec<std::io::Result<Bytes>> = bytes
                    .chunks((*chunk_size).max(1))
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Box::pin(stream::iter(chunks))
            }
            Behaviour::BrokenAtStart => Box::pin(stream::iter(vec![Err(io_error())])),
            Behaviour::BrokenAfter { good_chunks } => {
                let mut chunks: Vec<std::io::Result<Bytes>> = (0..*good_chunks)
                    .map(|_| Ok(Bytes::from_static(&[7u8; 64])))
                    .collect();
                chunks.push(Err(io_error()));
                Box::pin(stream::iter(chunks))
            }
            Behaviour::Endless => Box::pin(stream::repeat_with(|| {
                Ok(Bytes::from_static(&[1u8; 1024]))
            })),
            Behaviour::Nothing | Behaviour::Fail => Box::pin(stream::empty()),
        };

        Box::pin(ReleaseTracked {
            inner,
            released: Arc::clone(&self.released),
        })
    }
}

#[async_trait]
impl TrackResolver for MemoryResolver {
    async fn resolve(&self, _track: &TrackDescriptor) -> Result<Option<ResolvedStream>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Nothing => Ok(None),
            Behaviour::Fail => Err(Error::Resolver("extractor crashed".to_string())),
            _ => Ok(Some(ResolvedStream::new("audio/webm", self.stream()))),
        }
    }
}

/// Stream wrapper that flags when it is dropped
struct ReleaseTracked {
    inner: ByteStream,
    released: Arc<AtomicBool>,
}

impl Stream for ReleaseTracked {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for ReleaseTracked {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn io_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionReset, "upstream reset")
}

/// Deterministic test payload
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn sample_track() -> TrackDescriptor {
    TrackDescriptor {
        id: "yt_dQw4w9WgXcQ".to_string(),
        title: "Test Song".to_string(),
        artist: Some("Test Artist".to_string()),
        source: TrackSource::Youtube,
        url: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()),
    }
}

/// In-process delivery server
pub struct TestServer {
    router: Router,
}

/// Response with its body fully read
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Expected JSON body")
    }
}

impl TestServer {
    pub fn new(resolver: Arc<dyn TrackResolver>) -> Self {
        Self::with_limit(resolver, hmp_common::config::DEFAULT_MAX_BUFFERED_BYTES)
    }

    pub fn with_limit(resolver: Arc<dyn TrackResolver>, max_buffered_bytes: u64) -> Self {
        let ctx = AppContext {
            resolver,
            max_buffered_bytes,
        };
        Self {
            router: create_router(ctx, "*"),
        }
    }

    /// Send a request and return the raw response (body not read)
    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send a request and read the whole body
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.send(request).await;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

/// `/stream/play?trackData=<url-encoded json>`
pub fn progressive_uri(track_json: &str) -> String {
    let url = reqwest::Url::parse_with_params(
        "http://localhost/stream/play",
        &[("trackData", track_json)],
    )
    .unwrap();
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

pub fn progressive_request(track: &TrackDescriptor) -> Request<Body> {
    let uri = progressive_uri(&track.to_json().unwrap());
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn buffered_request(track: &TrackDescriptor, range: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/stream/play").header("content-type", "application/json");
    if let Some(range) = range {
        builder = builder.header("range", range);
    }
    builder
        .body(Body::from(json!({ "track": track }).to_string()))
        .unwrap()
}
