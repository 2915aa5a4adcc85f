//! Gesture GW - command line gateway
//!
//! Replays recorded inference results through the gesture pipeline and logs
//! the resulting actions.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use gesture_gw::clock::MonotonicClock;
use gesture_gw::config::{AppConfig, ConfigWatcher, DISABLED_MODE};
use gesture_gw::gateway::{Frame, ReplayGateway};
use gesture_gw::modes::InputAction;
use gesture_gw::output::{run_sink, ConsoleSink};
use gesture_gw::paths::AppPaths;
use gesture_gw::pipeline::{self, PipelineHandle, PipelineOptions, PipelineSnapshot};
use gesture_gw::tracking::TrackState;

/// Gesture Gateway - turn hand gestures into keyboard and mouse actions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the application data directory)
    #[arg(short, long, env = "GESTURE_GW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Recorded inference results to replay (JSON Lines)
    #[arg(long, env = "GESTURE_GW_REPLAY")]
    replay: Option<PathBuf>,

    /// Replay rate in frames per second
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Start in this mode instead of the configured one
    #[arg(long)]
    mode: Option<String>,

    /// List configured modes and their gesture mappings
    #[arg(long)]
    list_modes: bool,

    /// Directory for daily JSON log files
    #[arg(long, env = "GESTURE_GW_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let paths = match &args.config {
        Some(config) => AppPaths::for_config(config),
        None => AppPaths::detect(),
    };
    paths.ensure_directories().await?;

    let log_dir = args.log_dir.clone().unwrap_or_else(|| paths.logs_dir.clone());
    let _log_guard = init_logging(&args.log_level, &log_dir)?;

    info!("Starting Gesture GW v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    if args.list_modes {
        let config = AppConfig::load(&paths.config).await?;
        list_modes(&config);
        return Ok(());
    }

    let (config_watcher, config) = ConfigWatcher::new(&paths.config).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let gateway = match &args.replay {
        Some(path) => Arc::new(ReplayGateway::from_jsonl(path).await?),
        None => {
            warn!("No frame source given (--replay); waiting for Ctrl+C");
            Arc::new(ReplayGateway::new("idle", Vec::new()))
        }
    };
    let frame_count = gateway.len();
    let verbose_snapshots = config.app_modes.debug_mode;

    let pipeline = pipeline::spawn(
        config,
        gateway,
        Arc::new(MonotonicClock::new()),
        PipelineOptions::default(),
    )
    .context("Failed to start pipeline")?;
    let handle = pipeline.handle.clone();

    if let Some(mode) = &args.mode {
        handle
            .switch_mode(mode.clone())
            .await
            .with_context(|| format!("Cannot start in mode '{}'", mode))?;
    }

    let actions = pipeline.actions;
    let sink_task = tokio::spawn(async move {
        let sink = ConsoleSink::new("console");
        run_sink(&sink, actions).await
    });
    let snapshot_task = tokio::spawn(log_snapshots(handle.subscribe(), verbose_snapshots));

    let feeder = args
        .replay
        .is_some()
        .then(|| tokio::spawn(feed_frames(handle.clone(), frame_count, args.fps)));

    run_app(&handle, config_watcher, feeder).await;

    info!("Shutting down...");
    handle.stop().await;
    drop(handle);
    if let Err(e) = pipeline.task.await {
        warn!("Pipeline task failed: {}", e);
    }
    drop(pipeline.handle);
    snapshot_task.abort();
    match sink_task.await {
        Ok(Err(e)) => warn!("Input sink error: {:#}", e),
        Err(e) => warn!("Input sink task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Gesture GW shutdown complete");
    Ok(())
}

/// Forward config reloads until Ctrl+C or the end of the replay
async fn run_app(
    handle: &PipelineHandle,
    mut config_watcher: ConfigWatcher,
    mut feeder: Option<tokio::task::JoinHandle<()>>,
) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                match handle.reload_config(new_config).await {
                    Ok(()) => info!("✅ Configuration reloaded"),
                    Err(e) => warn!("⚠️  Failed to reload config (keeping old config): {}", e),
                }
            }

            _ = replay_finished(&mut feeder) => {
                info!("📼 Replay finished");
                break;
            }

            _ = &mut shutdown => {
                break;
            }
        }
    }
}

async fn replay_finished(feeder: &mut Option<tokio::task::JoinHandle<()>>) {
    match feeder {
        Some(task) => {
            if let Err(e) = task.await {
                warn!("Replay task failed: {}", e);
            }
            *feeder = None;
        }
        None => std::future::pending().await,
    }
}

/// Submit recorded frames at a fixed rate; frames are dropped while the
/// pipeline is busy
async fn feed_frames(handle: PipelineHandle, count: usize, fps: f64) {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut dropped = 0usize;
    for index in 0..count as u64 {
        ticker.tick().await;
        if !handle.try_submit_frame(Frame::empty(index)) {
            dropped += 1;
            debug!("Pipeline busy, dropping frame {}", index);
        }
    }
    info!("Submitted {} frames ({} dropped)", count - dropped, dropped);
}

/// Presentation stand-in: log mode and track changes
async fn log_snapshots(mut snapshots: broadcast::Receiver<PipelineSnapshot>, verbose: bool) {
    let mut last: Option<(String, Vec<TrackState>)> = None;
    loop {
        match snapshots.recv().await {
            Ok(snapshot) => {
                let key = (
                    snapshot.active_mode.clone(),
                    snapshot.tracks.iter().map(|t| t.track.state).collect::<Vec<_>>(),
                );
                if last.as_ref() == Some(&key) {
                    continue;
                }
                let tracks = snapshot
                    .tracks
                    .iter()
                    .map(|t| format!("{}={}", t.track.hand, t.track.state))
                    .collect::<Vec<_>>()
                    .join(" ");
                if verbose {
                    info!("👁️ frame {} | mode {} | {}", snapshot.frame_index, key.0, tracks);
                } else {
                    debug!("frame {} | mode {} | {}", snapshot.frame_index, key.0, tracks);
                }
                last = Some(key);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("Snapshot logger lagged, {} snapshots skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_logging(level: &str, log_dir: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(log_dir, "gesture-gw.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_filter(filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_filter(tracing_subscriber::EnvFilter::new(level)),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn list_modes(config: &AppConfig) {
    println!("\n{}", "=== Configured Modes ===".bold().cyan());
    println!(
        "  Current mode: {}",
        config.app_modes.current_mode.as_str().green()
    );

    for (key, mode) in &config.app_modes.modes {
        let marker = if *key == config.app_modes.current_mode {
            "●".green()
        } else {
            "○".normal()
        };
        println!("\n  {} {} ({})", marker, mode.name.bold(), key.yellow());
        for (gesture_id, action) in &mode.gestures {
            println!(
                "    {} → {} {} [{}s]",
                gesture_id.bright_white(),
                InputAction::from(&action.action),
                action.description.dimmed(),
                action.cooldown
            );
        }
    }

    if config.control_system.enable_key_control {
        println!(
            "\n  {} key control active in '{}'",
            "●".green(),
            DISABLED_MODE
        );
    }
    println!();
}
