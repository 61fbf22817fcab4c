//! Track resolution
//!
//! The delivery endpoint never searches providers or extracts audio itself.
//! It asks a [`TrackResolver`] for a byte stream and treats the result as
//! opaque encoded audio.
//!
//! Outcome mapping at the endpoint:
//! - `Ok(Some(stream))` → deliver
//! - `Ok(None)` → 404 (nothing to stream for this track)
//! - `Err(_)` → 500

pub mod command;
pub mod http;

pub use command::CommandResolver;
pub use http::HttpResolver;

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use hmp_common::config::ProviderConfig;
use hmp_common::{ByteStream, TrackDescriptor, TrackSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Media type used when a resolver cannot tell
pub const DEFAULT_CONTENT_TYPE: &str = "audio/webm";

/// A resolved, not yet consumed audio stream
///
/// Dropping the value releases whatever backs the stream (child process,
/// upstream connection, ...).
pub struct ResolvedStream {
    /// Media type to advertise in `Content-Type`
    pub content_type: String,
    /// Encoded audio bytes
    pub stream: ByteStream,
}

impl ResolvedStream {
    pub fn new(content_type: impl Into<String>, stream: ByteStream) -> Self {
        Self {
            content_type: content_type.into(),
            stream,
        }
    }
}

impl std::fmt::Debug for ResolvedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Resolves a track descriptor to a byte stream of encoded audio
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve `track`; `Ok(None)` when the provider has nothing to stream
    async fn resolve(&self, track: &TrackDescriptor) -> Result<Option<ResolvedStream>>;
}

/// Dispatches to a per-provider resolver
///
/// Providers without a configured resolver yield `Ok(None)`.
#[derive(Default, Clone)]
pub struct SourceRouter {
    resolvers: HashMap<TrackSource, Arc<dyn TrackResolver>>,
}

impl SourceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the resolver for one provider (replaces any previous one)
    pub fn with(mut self, source: TrackSource, resolver: Arc<dyn TrackResolver>) -> Self {
        self.resolvers.insert(source, resolver);
        self
    }

    /// Build from the `[providers.*]` configuration
    pub fn from_config(config: &Config) -> Self {
        let mut router = Self::new();
        for source in TrackSource::ALL {
            let Some(provider) = config.providers.get(&source) else {
                info!("No resolver configured for {}; its tracks will 404", source);
                continue;
            };
            let resolver: Arc<dyn TrackResolver> = match provider {
                ProviderConfig::Command {
                    program,
                    args,
                    content_type,
                } => Arc::new(CommandResolver::new(
                    program.clone(),
                    args.clone(),
                    content_type.clone(),
                )),
                ProviderConfig::Http { content_type } => {
                    Arc::new(HttpResolver::new(content_type.clone()))
                }
            };
            info!("Resolver for {}: {:?}", source, provider);
            router = router.with(source, resolver);
        }
        router
    }

    pub fn has_resolver(&self, source: TrackSource) -> bool {
        self.resolvers.contains_key(&source)
    }
}

#[async_trait]
impl TrackResolver for SourceRouter {
    async fn resolve(&self, track: &TrackDescriptor) -> Result<Option<ResolvedStream>> {
        match self.resolvers.get(&track.source) {
            Some(resolver) => resolver.resolve(track).await,
            None => {
                debug!("No resolver for source {} (track {})", track.source, track.id);
                Ok(None)
            }
        }
    }
}
