//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker file next to the executable
//!   keeps the config and logs in that directory.
//! - **Installed mode** (default): data lives in the platform config
//!   directory (`%APPDATA%\Gesture GW`, `~/.config/Gesture GW`).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;

/// Application name used for directories in installed mode
const APP_NAME: &str = "Gesture GW";

/// Default config file name
pub const CONFIG_FILE: &str = "gesture_config.json";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether running in portable mode (config next to exe)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// A `gesture_config.json` in the working directory wins in debug
    /// builds, so `cargo run` uses the project's copy.
    ///
    /// Note: called before logging is initialized.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            let cwd_config = cwd.join(CONFIG_FILE);
            if cwd_config.exists() {
                eprintln!("[paths] DEV mode ({} found in {})", CONFIG_FILE, cwd.display());
                return Self::portable_in(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            return Self::portable_in(&exe_dir);
        }

        let base = dirs::config_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no config directory, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        Self {
            config: base.join(CONFIG_FILE),
            logs_dir: base.join("logs"),
            is_portable: false,
        }
    }

    fn portable_in(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    /// Paths for an explicitly given config file; logs go next to it
    pub fn for_config(config: impl Into<PathBuf>) -> Self {
        let config = config.into();
        let base = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            logs_dir: base.join("logs"),
            config,
            is_portable: true,
        }
    }

    /// Create the logs and config directories, writing a default config if
    /// none exists yet.
    pub async fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            tokio::fs::create_dir_all(&self.logs_dir)
                .await
                .with_context(|| format!("Failed to create {}", self.logs_dir.display()))?;
        }

        if !self.config.exists() {
            if let Some(parent) = self.config.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!("No config found, writing defaults to {}", self.config.display());
            AppConfig::default().save(&self.config).await?;
        }

        Ok(())
    }
}
