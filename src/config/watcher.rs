//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Delay before re-reading, so editors finish writing
const SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Watches the JSON config file and yields each valid new version
///
/// Invalid edits are logged and skipped; the previous config stays in force.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config at `config_path` and start watching it
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<(Self, AppConfig)> {
        let config_path: PathBuf = config_path.into();
        let (tx, rx) = mpsc::channel(4);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();
        let file_name = config_path.file_name().map(|n| n.to_os_string());
        let reload_pending = Arc::new(AtomicBool::new(false));
        let watched_path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {}", e);
                    return;
                }
            };

            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_config {
                return;
            }
            debug!("Config file changed: {:?}", event.paths);

            // Collapse bursts of events into a single reload
            if reload_pending.swap(true, Ordering::SeqCst) {
                return;
            }

            let path = watched_path.clone();
            let tx = tx.clone();
            let pending = reload_pending.clone();
            runtime_handle.spawn(async move {
                tokio::time::sleep(SETTLE_DELAY).await;
                pending.store(false, Ordering::SeqCst);

                match AppConfig::load(&path).await {
                    Ok(new_config) => {
                        info!("Configuration reloaded from {}", path.display());
                        if tx.send(new_config).await.is_err() {
                            debug!("Config watcher receiver dropped");
                        }
                    }
                    Err(e) => {
                        warn!("Failed to reload config (keeping old config): {:#}", e);
                    }
                }
            });
        })?;

        // Watch the parent directory so atomic-rename saves are seen too
        let watch_target = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher
            .watch(watch_target, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path.display()))?;

        info!("Config file watcher started for: {}", config_path.display());

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial_config,
        ))
    }

    /// Wait for the next valid config
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}
