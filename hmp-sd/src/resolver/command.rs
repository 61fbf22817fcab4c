//! External extractor resolver
//!
//! Runs a configured program (typically a provider extractor such as
//! `yt-dlp -o - ...`) and streams its stdout. The child process lives exactly
//! as long as the stream: dropping the stream (client disconnect, buffered
//! drain aborted) kills it.

use super::{ResolvedStream, TrackResolver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use hmp_common::TrackDescriptor;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Placeholder replaced by `track.url`
const URL_PLACEHOLDER: &str = "{url}";
/// Placeholder replaced by `track.id`
const ID_PLACEHOLDER: &str = "{id}";

/// Streams the stdout of an extractor program
pub struct CommandResolver {
    program: String,
    args: Vec<String>,
    content_type: String,
}

impl CommandResolver {
    pub fn new(program: String, args: Vec<String>, content_type: String) -> Self {
        Self {
            program,
            args,
            content_type,
        }
    }

    /// Substitute placeholders; `None` when the track lacks a value an argument needs
    fn expand_args(&self, track: &TrackDescriptor) -> Option<Vec<String>> {
        self.args
            .iter()
            .map(|arg| {
                let mut expanded = arg.replace(ID_PLACEHOLDER, &track.id);
                if expanded.contains(URL_PLACEHOLDER) {
                    expanded = expanded.replace(URL_PLACEHOLDER, track.url.as_deref()?);
                }
                Some(expanded)
            })
            .collect()
    }
}

#[async_trait]
impl TrackResolver for CommandResolver {
    async fn resolve(&self, track: &TrackDescriptor) -> Result<Option<ResolvedStream>> {
        let Some(args) = self.expand_args(track) else {
            debug!("Track {} has no URL for {}", track.id, self.program);
            return Ok(None);
        };

        debug!("Spawning extractor: {} {:?}", self.program, args);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Resolver(format!("Failed to spawn {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Resolver("Extractor stdout not captured".to_string()))?;

        let program = self.program.clone();
        let track_id = track.id.clone();
        let stream = async_stream::stream! {
            // Owning the child here ties its lifetime to the stream
            let mut child = child;
            let mut reader = ReaderStream::new(stdout);
            let mut total: u64 = 0;

            while let Some(chunk) = reader.next().await {
                if let Ok(bytes) = &chunk {
                    total += bytes.len() as u64;
                }
                yield chunk;
            }

            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!("{} finished for {} ({} bytes)", program, track_id, total);
                }
                Ok(status) => {
                    warn!("{} exited with {} for {}", program, status, track_id);
                    yield Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("{} exited with {}", program, status),
                    ));
                }
                Err(e) => yield Err(e),
            }
        };

        Ok(Some(ResolvedStream::new(
            self.content_type.clone(),
            hmp_common::stream::boxed(stream),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmp_common::TrackSource;

    fn track(url: Option<&str>) -> TrackDescriptor {
        TrackDescriptor {
            id: "yt_42".to_string(),
            title: "Song".to_string(),
            artist: None,
            source: TrackSource::Youtube,
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_expand_args() {
        let resolver = CommandResolver::new(
            "yt-dlp".to_string(),
            vec!["-o".into(), "-".into(), "{url}".into(), "--id={id}".into()],
            "audio/webm".to_string(),
        );

        let args = resolver.expand_args(&track(Some("https://y/1"))).unwrap();
        assert_eq!(args, vec!["-o", "-", "https://y/1", "--id=yt_42"]);

        // URL placeholder with no URL: nothing to resolve
        assert!(resolver.expand_args(&track(None)).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_program_stdout() {
        let resolver = CommandResolver::new(
            "echo".to_string(),
            vec!["-n".into(), "{id}".into()],
            "audio/webm".to_string(),
        );

        let resolved = resolver.resolve(&track(None)).await.unwrap().unwrap();
        let chunks: Vec<_> = resolved.stream.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .map(|c| c.unwrap())
            .flat_map(|b| b.to_vec())
            .collect();

        assert_eq!(body, b"yt_42");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_ends_stream_with_error() {
        let resolver = CommandResolver::new("false".to_string(), vec![], "audio/webm".to_string());

        let resolved = resolver.resolve(&track(None)).await.unwrap().unwrap();
        let chunks: Vec<_> = resolved.stream.collect().await;

        assert!(chunks.last().map(|c| c.is_err()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_missing_program_is_resolver_error() {
        let resolver = CommandResolver::new(
            "/nonexistent/extractor".to_string(),
            vec![],
            "audio/webm".to_string(),
        );

        assert!(matches!(
            resolver.resolve(&track(None)).await,
            Err(Error::Resolver(_))
        ));
    }
}
