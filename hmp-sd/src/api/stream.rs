//! Stream delivery endpoints
//!
//! Both modes resolve the same track descriptor but never share buffering:
//! GET pipes, POST drains.

use super::AppContext;
use crate::delivery::{drain_stream, prime, StreamTransferDescriptor};
use crate::error::{Error, Result};
use crate::resolver::ResolvedStream;
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use hmp_common::TrackDescriptor;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// JSON-encoded TrackDescriptor
    pub track_data: Option<String>,
}

// ============================================================================
// Progressive Mode
// ============================================================================

/// GET /stream/play?trackData=<json> - Pipe the resolved stream as it arrives
///
/// Total length is unknown, so a `Range` header is acknowledged with
/// `Accept-Ranges: bytes` but the body always starts at byte 0.
pub async fn stream_progressive(
    State(ctx): State<AppContext>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let raw = query
        .track_data
        .filter(|raw| !raw.trim().is_empty())
        .ok_or_else(|| Error::BadRequest("Track data required".to_string()))?;
    let track = TrackDescriptor::parse_json(&raw)?;

    let transfer_id = Uuid::new_v4();
    info!(
        "Progressive transfer {} for {} ({})",
        transfer_id,
        track.display_name(),
        track.source
    );
    if let Some(range) = headers.get(header::RANGE) {
        debug!(
            "Transfer {}: ignoring Range {:?}, progressive body starts at 0",
            transfer_id, range
        );
    }

    let resolved = resolve(&ctx, &track).await?;
    let content_type = resolved.content_type;
    let primed = prime(resolved.stream).await.map_err(|e| {
        error!("Transfer {} failed before headers: {}", transfer_id, e);
        e
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(primed.into_body(transfer_id)))
        .map_err(|e| Error::Http(format!("Failed to build response: {}", e)))
}

// ============================================================================
// Buffered Mode
// ============================================================================

/// POST /stream/play - Drain the resolved stream, then answer 200 or 206
///
/// Body: `{"track": TrackDescriptor}`. Honors a single `Range: bytes=s-e` or
/// `bytes=s-`.
pub async fn stream_buffered(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let track = parse_track_body(&body)?;

    // A non-ASCII header value can never be a valid range
    let range = headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    info!(
        "Buffered request for {} ({}), range {:?}",
        track.display_name(),
        track.source,
        range
    );

    let resolved = resolve(&ctx, &track).await?;
    let content_type = resolved.content_type;
    let payload = drain_stream(resolved.stream, ctx.max_buffered_bytes)
        .await
        .map_err(|e| {
            error!("Buffering {} failed: {}", track.id, e);
            e
        })?;

    let descriptor = StreamTransferDescriptor::new(payload.len() as u64, range.as_deref())?;
    info!(
        "Buffered transfer {}: {} of {} bytes ({})",
        descriptor.transfer_id,
        descriptor.content_length(),
        descriptor.total_length,
        descriptor.status()
    );

    let mut response = Response::builder()
        .status(descriptor.status())
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, descriptor.content_length())
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(content_range) = descriptor.content_range() {
        response = response.header(header::CONTENT_RANGE, content_range);
    }

    response
        .body(Body::from(descriptor.slice(&payload)))
        .map_err(|e| Error::Http(format!("Failed to build response: {}", e)))
}

/// Extract the `track` member of a buffered-mode request body
fn parse_track_body(body: &[u8]) -> Result<TrackDescriptor> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::BadRequest(format!("Invalid JSON body: {}", e)))?;

    match value.get("track") {
        Some(track) if !track.is_null() => serde_json::from_value(track.clone())
            .map_err(|e| Error::BadRequest(format!("Invalid track descriptor: {}", e))),
        _ => Err(Error::BadRequest("Track required".to_string())),
    }
}

/// Resolve through the configured resolver, `Ok(None)` becoming 404
async fn resolve(ctx: &AppContext, track: &TrackDescriptor) -> Result<ResolvedStream> {
    match ctx.resolver.resolve(track).await {
        Ok(Some(resolved)) => Ok(resolved),
        Ok(None) => Err(Error::NotFound(format!(
            "No stream found for track {}",
            track.id
        ))),
        Err(e) => {
            error!("Resolving {} failed: {}", track.id, e);
            Err(e)
        }
    }
}
