//! Byte-range handling for buffered delivery
//!
//! Only the single-range forms `bytes=<start>-<end>` and `bytes=<start>-` are
//! accepted. Every other shape (suffix ranges, multiple ranges, other units,
//! negative or non-numeric bounds) is rejected as unsatisfiable rather than
//! guessed at, so a malformed request can never produce a corrupted slice.

use crate::error::{Error, Result};
use axum::http::StatusCode;
use bytes::Bytes;
use uuid::Uuid;

/// Bounds as written in the request (end not yet clamped)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// Inclusive byte range within a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered (`end - start + 1`, never zero)
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range` header value
///
/// Returns a human-readable reason on rejection.
pub fn parse_range_header(value: &str) -> std::result::Result<RequestedRange, String> {
    let spec = value
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| format!("Unsupported range unit in {:?}", value))?;

    if spec.contains(',') {
        return Err("Multiple ranges are not supported".to_string());
    }

    let (start, end) = spec
        .split_once('-')
        .ok_or_else(|| format!("Missing '-' in range {:?}", spec))?;

    let start = start.trim();
    if start.is_empty() {
        return Err("Suffix or negative ranges are not supported".to_string());
    }
    let start = parse_bound(start)?;

    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        Some(parse_bound(end)?)
    };

    Ok(RequestedRange { start, end })
}

fn parse_bound(bound: &str) -> std::result::Result<u64, String> {
    if !bound.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("Invalid range bound {:?}", bound));
    }
    bound
        .parse::<u64>()
        .map_err(|e| format!("Invalid range bound {:?}: {}", bound, e))
}

/// Per-request transfer descriptor for one buffered delivery
///
/// Lives for the duration of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTransferDescriptor {
    /// Correlates the log lines of one transfer
    pub transfer_id: Uuid,
    /// Length of the fully materialized payload
    pub total_length: u64,
    /// Range as requested, if any
    pub requested_range: Option<RequestedRange>,
    /// Range actually served; `None` for an empty payload without a `Range`
    pub response_range: Option<ByteRange>,
}

impl StreamTransferDescriptor {
    /// Compute what to send for a payload of `total_length` bytes
    ///
    /// - no `Range` → whole payload (`200`)
    /// - `bytes=s-e` → `end = min(e, total-1)` (`206`)
    /// - `bytes=s-` → `end = total-1` (`206`)
    /// - `start > end` or `start >= total` → `Error::RangeNotSatisfiable`
    pub fn new(total_length: u64, range_header: Option<&str>) -> Result<Self> {
        let transfer_id = Uuid::new_v4();
        let unsatisfiable = |reason: String| Error::RangeNotSatisfiable {
            reason,
            total_length,
        };

        let Some(header) = range_header else {
            let response_range = (total_length > 0).then(|| ByteRange {
                start: 0,
                end: total_length - 1,
            });
            return Ok(Self {
                transfer_id,
                total_length,
                requested_range: None,
                response_range,
            });
        };

        let requested = parse_range_header(header).map_err(unsatisfiable)?;

        if let Some(end) = requested.end {
            if requested.start > end {
                return Err(unsatisfiable(format!(
                    "Range start {} is after end {}",
                    requested.start, end
                )));
            }
        }
        if requested.start >= total_length {
            return Err(unsatisfiable(format!(
                "Range start {} is beyond payload length {}",
                requested.start, total_length
            )));
        }

        let last = total_length - 1;
        let end = requested.end.map_or(last, |end| end.min(last));

        Ok(Self {
            transfer_id,
            total_length,
            requested_range: Some(requested),
            response_range: Some(ByteRange {
                start: requested.start,
                end,
            }),
        })
    }

    /// Whether this is a partial (`206`) response
    pub fn is_partial(&self) -> bool {
        self.requested_range.is_some()
    }

    pub fn status(&self) -> StatusCode {
        if self.is_partial() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }

    /// Value of `Content-Length`
    pub fn content_length(&self) -> u64 {
        self.response_range.map_or(0, |r| r.len())
    }

    /// Value of `Content-Range` for partial responses
    pub fn content_range(&self) -> Option<String> {
        match (self.is_partial(), self.response_range) {
            (true, Some(range)) => Some(format!(
                "bytes {}-{}/{}",
                range.start, range.end, self.total_length
            )),
            _ => None,
        }
    }

    /// The bytes to send, sharing the payload's allocation
    pub fn slice(&self, payload: &Bytes) -> Bytes {
        match self.response_range {
            Some(range) => payload.slice(range.start as usize..=range.end as usize),
            None => Bytes::new(),
        }
    }
}
