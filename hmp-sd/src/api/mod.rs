//! HTTP API for the stream delivery server
//!
//! Routes:
//! - `GET /health`, `GET /build_info`
//! - `GET /stream/play?trackData=<json>` (progressive)
//! - `POST /stream/play` with `{"track": {...}}` (buffered, Range aware)

pub mod handlers;
pub mod server;
pub mod stream;

use crate::resolver::TrackResolver;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    /// Resolves track descriptors to byte streams
    pub resolver: Arc<dyn TrackResolver>,
    /// Upper bound for one buffered-mode payload
    pub max_buffered_bytes: u64,
}

/// Create the API router
pub fn create_router(ctx: AppContext, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/build_info", get(handlers::build_info))
        .route(
            "/stream/play",
            get(stream::stream_progressive).post(stream::stream_buffered),
        )
        .with_state(ctx)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the browser player
///
/// Range related response headers are exposed so that a cross-origin player
/// can read them.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::RANGE])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
        ]);

    if origin == "*" {
        return layer.allow_origin(Any);
    }

    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
        Err(e) => {
            warn!("Invalid CORS origin {:?} ({}), allowing any origin", origin, e);
            layer.allow_origin(Any)
        }
    }
}
