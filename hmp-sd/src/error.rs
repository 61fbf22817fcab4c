//! Error types for hmp-sd
//!
//! Every delivery failure maps to exactly one HTTP status. Errors raised after
//! response headers were committed never reach this type: they terminate the
//! connection instead (see `delivery::progressive`).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for hmp-sd
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Missing or unparseable track descriptor
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resolution yielded no stream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or unsatisfiable `Range` header
    #[error("Range not satisfiable: {reason}")]
    RangeNotSatisfiable {
        reason: String,
        /// Total payload length, reported in `Content-Range: bytes */{total}`
        total_length: u64,
    },

    /// Buffered payload exceeds the configured in-memory limit
    #[error("Track exceeds buffered delivery limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Resolver failed (extractor crashed, upstream unreachable, ...)
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// Stream broke while being read
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using hmp-sd Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::PayloadTooLarge { .. } => StatusCode::INSUFFICIENT_STORAGE,
            Error::Config(_)
            | Error::Http(_)
            | Error::Resolver(_)
            | Error::Transfer(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<hmp_common::Error> for Error {
    fn from(err: hmp_common::Error) -> Self {
        match err {
            hmp_common::Error::InvalidInput(msg) => Error::BadRequest(msg),
            hmp_common::Error::Config(msg) => Error::Config(msg),
            hmp_common::Error::Io(e) => Error::Io(e),
            hmp_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));

        match self {
            Error::RangeNotSatisfiable { total_length, .. } => {
                let mut response = (status, body).into_response();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total_length)) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
                response
            }
            _ => (status, body).into_response(),
        }
    }
}
