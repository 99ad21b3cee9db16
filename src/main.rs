use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtc_playout::config::{AppConfig, ConfigStore};
use rtc_playout::events::EventBus;
use rtc_playout::state::AppState;
use rtc_playout::web;

/// Media directory used when neither the CLI nor the config file set one
const MEDIA_DIR_ENV: &str = "RTC_PLAYOUT_MEDIA_DIR";

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// rtc-playout command line arguments
#[derive(Parser, Debug)]
#[command(name = "rtc-playout")]
#[command(version, about = "Play IVF/Ogg files to a browser over WebRTC", long_about = None)]
struct CliArgs {
    /// JSON config file, written back on PATCH /api/config/* unless an override flag is given
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Directory with the .ivf/.ogg files (overrides config)
    #[arg(short = 'm', long, value_name = "DIR")]
    media_dir: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting rtc-playout v{}", env!("CARGO_PKG_VERSION"));

    let config_store = ConfigStore::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    let mut config = (*config_store.get()).clone();

    // Apply CLI argument overrides to config (only if explicitly specified)
    let mut overridden = false;
    if let Some(addr) = args.address {
        config.web.bind_address = addr;
        overridden = true;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
        overridden = true;
    }
    if let Some(dir) = args.media_dir {
        config.media.dir = dir.to_string_lossy().into_owned();
        overridden = true;
    } else if args.config.is_none() {
        if let Ok(dir) = std::env::var(MEDIA_DIR_ENV) {
            config.media.dir = dir;
            overridden = true;
        }
    }

    // Overrides are runtime-only and never written back to the file
    let config_store = if overridden {
        ConfigStore::in_memory(config.clone())
    } else {
        config_store
    };
    log_config(&config);

    let events = Arc::new(EventBus::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(config_store, events, shutdown_tx.clone());
    state.spawn_config_watcher();

    // The one session exists from startup, tracks attached
    state
        .sessions
        .current()
        .await
        .context("Failed to create peer session")?;

    let addr: SocketAddr = format!("{}:{}", config.web.bind_address, config.web.http_port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.web.bind_address, config.web.http_port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("HTTP server listening on http://{}", addr);

    let app = web::create_router(state.clone());

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("HTTP server error")?;

    cleanup(&state).await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "rtc_playout=error,tower_http=error,webrtc=error",
        LogLevel::Warn => "rtc_playout=warn,tower_http=warn,webrtc=warn",
        LogLevel::Info => "rtc_playout=info,tower_http=info,webrtc=warn",
        LogLevel::Verbose => "rtc_playout=debug,tower_http=info,webrtc=warn",
        LogLevel::Debug => "rtc_playout=debug,tower_http=debug,webrtc=info",
        LogLevel::Trace => "rtc_playout=trace,tower_http=debug,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

fn log_config(config: &AppConfig) {
    tracing::info!(
        "Media directory: {} (default files {} / {})",
        config.media.dir,
        config.media.video_file,
        config.media.audio_file
    );
    tracing::debug!(
        "Pacing: audio page {} ms at {} Hz, announced video duration {:?}",
        config.pacing.audio_page_ms,
        config.pacing.audio_sample_rate,
        config.pacing.video_announced_duration_ms
    );
    if config.webrtc.stun_servers.is_empty() && config.webrtc.turn_servers.is_empty() {
        tracing::info!("No STUN/TURN servers configured, host candidates only");
    }
}

/// Clean up before exit
async fn cleanup(state: &Arc<AppState>) {
    if let Err(e) = state.sessions.close().await {
        tracing::warn!("Failed to close peer session: {}", e);
    } else {
        tracing::info!("Peer session closed");
    }
}
