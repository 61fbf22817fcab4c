//! Delivery server client
//!
//! [`StreamClient`] is the engine's view of the delivery endpoint: one
//! progressive request and one buffered request per track.
//! [`HttpStreamClient`] is the reqwest implementation.

use crate::error::{Error, Result};
use crate::playback::session::BufferedPayload;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use hmp_common::{ByteStream, TrackDescriptor};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("hmp-pe/", env!("CARGO_PKG_VERSION"));

/// Media type assumed when the server does not send one
const FALLBACK_CONTENT_TYPE: &str = "audio/webm";

/// Progressive response: headers received, body still streaming
pub struct ProgressiveStream {
    pub content_type: String,
    pub body: ByteStream,
}

/// Buffered response: headers accepted, body not yet drained
pub struct BufferedDownload {
    pub content_type: String,
    /// Declared `Content-Length`, when present
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl BufferedDownload {
    /// Drain the body into a [`BufferedPayload`]
    ///
    /// A body shorter than the declared length is a transfer failure.
    pub async fn collect(self) -> Result<BufferedPayload> {
        let capacity = self.content_length.unwrap_or(0).min(64 * 1024 * 1024) as usize;
        let mut buffer = BytesMut::with_capacity(capacity);
        let mut body = self.body;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                Error::Transfer(format!("Download failed after {} bytes: {}", buffer.len(), e))
            })?;
            buffer.extend_from_slice(&chunk);
        }

        if let Some(expected) = self.content_length {
            if buffer.len() as u64 != expected {
                return Err(Error::Transfer(format!(
                    "Download truncated: {} of {} bytes",
                    buffer.len(),
                    expected
                )));
            }
        }

        Ok(BufferedPayload::new(buffer.freeze()))
    }
}

/// Access to the delivery endpoint
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Open the progressive (GET) stream
    async fn open_progressive(&self, track: &TrackDescriptor) -> Result<ProgressiveStream>;

    /// Issue the buffered (POST) request and wait for its headers
    async fn open_buffered(&self, track: &TrackDescriptor) -> Result<BufferedDownload>;
}

/// reqwest implementation of [`StreamClient`]
pub struct HttpStreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self) -> String {
        format!("{}/stream/play", self.base_url)
    }
}

#[async_trait]
impl StreamClient for HttpStreamClient {
    async fn open_progressive(&self, track: &TrackDescriptor) -> Result<ProgressiveStream> {
        let track_data = track.to_json()?;
        debug!("GET {} for {}", self.stream_url(), track.id);

        let response = self
            .client
            .get(self.stream_url())
            .query(&[("trackData", track_data)])
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("Progressive request failed: {}", e)))?;
        let response = check_status(response).await?;

        info!("Progressive stream open for {}", track.id);
        Ok(ProgressiveStream {
            content_type: content_type(&response),
            body: body_stream(response),
        })
    }

    async fn open_buffered(&self, track: &TrackDescriptor) -> Result<BufferedDownload> {
        debug!("POST {} for {}", self.stream_url(), track.id);

        let response = self
            .client
            .post(self.stream_url())
            .json(&json!({ "track": track }))
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("Buffered request failed: {}", e)))?;
        let response = check_status(response).await?;

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        info!(
            "Buffered download accepted for {} ({:?} bytes)",
            track.id, content_length
        );
        Ok(BufferedDownload {
            content_type: content_type(&response),
            content_length,
            body: body_stream(response),
        })
    }
}

/// Map non-2xx responses to the error taxonomy, using the server's
/// `{"error": ...}` body as message when there is one
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::NOT_FOUND => Error::Resolution(message),
        StatusCode::RANGE_NOT_SATISFIABLE => Error::InvalidRange(message),
        _ => Error::Transfer(message),
    })
}

fn content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

fn body_stream(response: reqwest::Response) -> ByteStream {
    hmp_common::stream::boxed(
        response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    )
}
