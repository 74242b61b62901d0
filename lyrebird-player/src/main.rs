//! Lyrebird player - main entry point
//!
//! Wires the audio output, playback engine, session transport and HTTP
//! control surface together and runs until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lyrebird_common::{config::Settings, EventBus};
use lyrebird_player::api::{self, AppContext};
use lyrebird_player::audio::CpalSink;
use lyrebird_player::playback::{EngineConfig, PlayerEngine};
use lyrebird_player::session::{router::MessageRouter, stub::StubSession};
use lyrebird_player::storage::FilePresetStore;

/// Command-line arguments for lyrebird-player
#[derive(Parser, Debug)]
#[command(name = "lyrebird-player")]
#[command(about = "Streaming player for realtime generative music")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "LYREBIRD_PORT")]
    port: Option<u16>,

    /// Config file path
    #[arg(short, long, env = "LYREBIRD_CONFIG")]
    config: Option<PathBuf>,

    /// Audio output device name (overrides config file)
    #[arg(short, long, env = "LYREBIRD_AUDIO_DEVICE")]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lyrebird_player=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    let port = args.port.unwrap_or(settings.port);
    let device = args.device.clone().or_else(|| settings.audio_device.clone());

    info!("Starting Lyrebird player on port {}", port);

    let data_dir = settings.resolve_data_dir();
    let presets = Arc::new(
        FilePresetStore::new(data_dir.join("presets"))
            .context("Failed to open preset store")?,
    );

    let events = Arc::new(EventBus::new(256));
    let (command_tx, command_rx) = mpsc::channel(64);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);

    let (sink, clock) =
        CpalSink::spawn(device).context("Failed to initialize audio output")?;
    info!("audio output ready at {} Hz", sink.sample_rate());

    let engine = Arc::new(PlayerEngine::new(
        Arc::new(clock),
        Box::new(sink),
        command_tx,
        Arc::clone(&events),
        EngineConfig {
            buffer_lead_seconds: settings.buffer_lead_seconds,
            coalesce_window_ms: settings.coalesce_window_ms,
        },
    ));
    engine.set_volume(settings.volume);

    // Session transport: offline stub generator speaking the wire protocol
    tokio::spawn(StubSession::new(inbound_tx).run(command_rx));
    tokio::spawn(MessageRouter::new(Arc::clone(&engine)).run(inbound_rx));
    engine.spawn_progress_reporter(Duration::from_secs(1));

    // Kick off the session handshake
    engine.connect().context("Failed to request connection")?;

    let ctx = AppContext {
        engine,
        events,
        presets,
    };

    api::run(port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
