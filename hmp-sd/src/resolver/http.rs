//! Direct HTTP resolver
//!
//! Proxies `track.url` through reqwest's streaming body. Useful for providers
//! that expose a plain audio URL.

use super::{ResolvedStream, TrackResolver, DEFAULT_CONTENT_TYPE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use hmp_common::TrackDescriptor;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("hmp-sd/", env!("CARGO_PKG_VERSION"));

/// Streams `track.url` over HTTP
pub struct HttpResolver {
    client: reqwest::Client,
    /// Fixed media type; when `None` the upstream `Content-Type` is used
    content_type: Option<String>,
}

impl HttpResolver {
    pub fn new(content_type: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            content_type,
        }
    }
}

#[async_trait]
impl TrackResolver for HttpResolver {
    async fn resolve(&self, track: &TrackDescriptor) -> Result<Option<ResolvedStream>> {
        let Some(url) = track.url.as_deref() else {
            debug!("Track {} has no URL to fetch", track.id);
            return Ok(None);
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Resolver(format!("Upstream request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => return Ok(None),
            status => {
                return Err(Error::Resolver(format!(
                    "Upstream returned {} for {}",
                    status, track.id
                )))
            }
        }

        let content_type = self
            .content_type
            .clone()
            .or_else(|| {
                response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| v.starts_with("audio/"))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(Some(ResolvedStream::new(
            content_type,
            hmp_common::stream::boxed(stream),
        )))
    }
}
