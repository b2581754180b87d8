//! NanoRadio audio player (nanoradio-ap) - Main entry point
//!
//! Bring-up harness for the streaming pipeline: plays one station URL until
//! the stream ends or the process is interrupted.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nanoradio_ap::audio::{CpalOutput, NullOutput, OutputDevice};
use nanoradio_ap::config::{ConfigOverrides, LoggingConfig, PlayerConfig};
use nanoradio_ap::StreamSession;
use nanoradio_common::config::{resolve_config_path, CONFIG_ENV_VAR};

/// Device name that selects the discarding output
const NULL_DEVICE: &str = "null";

/// Command-line arguments for nanoradio-ap
#[derive(Parser, Debug)]
#[command(name = "nanoradio-ap")]
#[command(about = "Internet radio stream player")]
#[command(version)]
struct Args {
    /// Stream URL (defaults to `station` from the config file)
    url: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NANORADIO_LOG_LEVEL")]
    log_level: Option<String>,

    /// Audio output device name ("null" discards audio)
    #[arg(short, long, env = "NANORADIO_DEVICE")]
    device: Option<String>,

    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = PlayerConfig::load(
        config_path.as_deref(),
        ConfigOverrides {
            log_level: args.log_level.clone(),
            audio_device: args.device.clone(),
        },
    )
    .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!(
        "Starting nanoradio-ap (git {}, built {}, {})",
        env!("NANORADIO_GIT_HASH"),
        env!("NANORADIO_BUILD_TIMESTAMP"),
        env!("NANORADIO_BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Configuration file: {}", path.display());
    }

    if args.list_devices {
        for name in CpalOutput::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let url = args
        .url
        .clone()
        .or_else(|| config.station.clone())
        .context("No stream URL given (pass one or set `station` in the config file)")?;

    let mut underruns = None;
    let device: Box<dyn OutputDevice> = match config.audio.device.as_deref() {
        Some(NULL_DEVICE) => {
            info!("Audio output disabled (null device)");
            Box::new(NullOutput)
        }
        name => {
            let output = CpalOutput::new(name.map(str::to_string), config.audio.pcm_queue_frames);
            underruns = Some(output.underrun_counter());
            Box::new(output)
        }
    };

    let session = Arc::new(
        StreamSession::init(config, device).context("Failed to initialize stream session")?,
    );

    session
        .open_url(&url)
        .with_context(|| format!("Failed to open stream {}", url))?;

    let finished = {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.wait())
    };

    tokio::select! {
        _ = finished => {
            info!("Stream finished");
        },
        _ = shutdown_signal() => {},
    }

    let stats = session.stats();
    info!(
        "Received {} bytes, ring buffer overflows={}, underflows={}",
        stats.bytes_received, stats.ring.overflow_count, stats.ring.underflow_count
    );
    if let Some(underruns) = &underruns {
        info!("Audio output underruns: {}", underruns.load(Ordering::Relaxed));
    }

    {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.stop())
            .await
            .context("Stream shutdown failed")?;
    }

    if let Some(code) = stats.last_error {
        warn!("Stream ended with error: {:?}", code);
        anyhow::bail!("stream ended with error {:?}", code);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing: `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nanoradio_ap={0},nanoradio_common={0}",
            logging.level
        ))
    });

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
