//! Headless player (hmp-play) - Main entry point
//!
//! Plays one track from a delivery server through the playback engine with
//! the headless sink and logs the event stream until the track ends.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hmp_common::config::{locate_config_file, TomlConfig};
use hmp_common::events::PlayerEvent;
use hmp_common::{TrackDescriptor, TrackSource};
use hmp_pe::audio::{sink_event_channel, HeadlessSink};
use hmp_pe::client::HttpStreamClient;
use hmp_pe::config::{EngineConfig, PlayStrategy};
use hmp_pe::PlaybackEngine;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for hmp-play
#[derive(Parser, Debug)]
#[command(name = "hmp-play")]
#[command(about = "Headless player for the hybrid streaming protocol")]
#[command(version)]
struct Args {
    /// Config file (overrides HMP_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delivery server base URL
    #[arg(short, long, env = "HMP_BACKEND_URL")]
    backend_url: Option<String>,

    /// hybrid, progressive or buffered
    #[arg(short, long)]
    strategy: Option<PlayStrategy>,

    /// Full track descriptor as JSON
    #[arg(long, conflicts_with_all = ["url", "id", "title", "artist"])]
    track_json: Option<String>,

    /// Provider URL of the track
    #[arg(long, required_unless_present = "track_json")]
    url: Option<String>,

    /// Provider of the track
    #[arg(long, default_value = "youtube")]
    source: TrackSource,

    /// Track id (defaults to the URL)
    #[arg(long)]
    id: Option<String>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    artist: Option<String>,

    /// Volume in percent
    #[arg(long)]
    volume: Option<f64>,
}

impl Args {
    fn track(&self) -> Result<TrackDescriptor> {
        if let Some(json) = &self.track_json {
            return TrackDescriptor::parse_json(json).context("Invalid --track-json");
        }

        let url = self
            .url
            .clone()
            .context("Either --url or --track-json is required")?;
        Ok(TrackDescriptor {
            id: self.id.clone().unwrap_or_else(|| url.clone()),
            title: self.title.clone().unwrap_or_else(|| url.clone()),
            artist: self.artist.clone(),
            source: self.source,
            url: Some(url),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},hmp_pe=debug", toml.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match locate_config_file(args.config.as_deref()) {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        _ => debug!("No config file, using defaults"),
    }

    let mut config = EngineConfig::from_toml(&toml).context("Invalid configuration")?;
    if let Some(url) = &args.backend_url {
        config.backend_url = url.trim_end_matches('/').to_string();
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    let strategy = config.strategy;
    let track = args.track()?;

    let client = HttpStreamClient::new(config.backend_url.clone())
        .context("Failed to create HTTP client")?;
    let (sink_tx, sink_rx) = sink_event_channel();
    let sink = HeadlessSink::new(sink_tx, config.time_update_interval);
    let engine = Arc::new(PlaybackEngine::new(sink, sink_rx, Arc::new(client), config));

    let mut events = engine.subscribe();
    if let Some(volume) = args.volume {
        let applied = engine.set_volume(volume).await?;
        info!("Volume {}%", applied);
    }

    info!("Playing {}", track.display_name());
    engine.play_track(track).await?;

    let outcome = tokio::select! {
        outcome = watch_events(&mut events, strategy) => outcome,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
            Ok(())
        }
    };

    let snapshot = engine.snapshot();
    info!(
        "Stopped at {:.1}s (phase {}, upgraded: {})",
        snapshot.position, snapshot.phase, snapshot.upgraded
    );
    engine.destroy().await?;

    outcome
}

/// Log events until playback ends or can no longer recover
async fn watch_events(
    events: &mut tokio::sync::broadcast::Receiver<PlayerEvent>,
    strategy: PlayStrategy,
) -> Result<()> {
    let mut progressive_failed = false;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => bail!("Engine stopped unexpectedly"),
        };

        match &event {
            PlayerEvent::TimeUpdate { .. } | PlayerEvent::BufferProgress { .. } => {}
            PlayerEvent::Error { kind, message, .. } => {
                error!("Playback error ({:?}): {}", kind, message)
            }
            PlayerEvent::Warning { message, .. } | PlayerEvent::SeekWarning { message } => {
                warn!("{}", message)
            }
            PlayerEvent::Upgraded { position, .. } => {
                info!("Upgraded to the buffered payload at {:.2}s", position)
            }
            PlayerEvent::Playback { mode, .. } => info!("Playback started ({:?})", mode),
            other => info!("Event: {}", other.name()),
        }

        match event {
            PlayerEvent::Ended => return Ok(()),
            PlayerEvent::Error { .. } if strategy != PlayStrategy::Hybrid => {
                bail!("Playback failed")
            }
            PlayerEvent::Error { .. } => progressive_failed = true,
            PlayerEvent::Warning { .. } if progressive_failed => {
                bail!("Playback failed and the full download did not recover it")
            }
            _ => {}
        }
    }
}
