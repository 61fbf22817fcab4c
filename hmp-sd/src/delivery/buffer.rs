//! Full materialization of a resolved stream for buffered delivery
//!
//! Buffered mode trades memory for seekability: the whole track is held in
//! process memory for the duration of one response. The drain is bounded by
//! `max_bytes`; a stream that grows past the bound is dropped (releasing the
//! resolver) and the request fails instead of exhausting memory.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use hmp_common::ByteStream;
use tracing::debug;

/// Initial allocation; most tracks are a few megabytes
const INITIAL_CAPACITY: usize = 1024 * 1024;

/// Drain `stream` completely into one contiguous payload
pub async fn drain_stream(mut stream: ByteStream, max_bytes: u64) -> Result<Bytes> {
    let mut buffer = BytesMut::with_capacity(INITIAL_CAPACITY.min(max_bytes as usize));
    let mut chunks = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            Error::Transfer(format!(
                "Stream failed after {} bytes: {}",
                buffer.len(),
                e
            ))
        })?;

        if buffer.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(Error::PayloadTooLarge { limit: max_bytes });
        }

        buffer.extend_from_slice(&chunk);
        chunks += 1;
    }

    debug!("Drained {} bytes in {} chunks", buffer.len(), chunks);
    Ok(buffer.freeze())
}
