//! Tracker configuration
//!
//! Read from `config.toml` under the platform config directory:
//! - Linux: ~/.config/repo-tracker/config.toml
//! - macOS: ~/Library/Application Support/repo-tracker/config.toml
//! - Windows: %APPDATA%\repo-tracker\config.toml
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Environment variable overriding the git executable
pub const GIT_ENV_VAR: &str = "REPO_TRACKER_GIT";

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Path to the git executable (default: `REPO_TRACKER_GIT`, then `PATH`)
    #[serde(default)]
    pub git_path: Option<PathBuf>,

    /// Quiet period that must pass after the last change before a rescan
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Upper bound on how long a burst of changes may defer a rescan
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// OS event coalescing window inside the watcher
    #[serde(default = "default_watch_coalesce_ms")]
    pub watch_coalesce_ms: u64,

    /// Wall-clock limit for each git invocation
    #[serde(default = "default_process_timeout_ms")]
    pub process_timeout_ms: u64,

    /// Start a filesystem watcher on open
    #[serde(default = "default_true")]
    pub watch_filesystem: bool,

    /// Report ignored files as `Ignored` entries
    #[serde(default)]
    pub include_ignored: bool,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_max_wait_ms() -> u64 {
    2_000
}

fn default_watch_coalesce_ms() -> u64 {
    50
}

fn default_process_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            git_path: None,
            debounce_ms: default_debounce_ms(),
            max_wait_ms: default_max_wait_ms(),
            watch_coalesce_ms: default_watch_coalesce_ms(),
            process_timeout_ms: default_process_timeout_ms(),
            watch_filesystem: true,
            include_ignored: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("repo-tracker").join("config.toml"))
    }

    /// Load configuration from the default path (defaults if absent)
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| TrackerError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        tracing::debug!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }

    /// Reject settings the scheduler cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_wait_ms < self.debounce_ms {
            return Err(TrackerError::Config {
                message: format!(
                    "max_wait_ms ({}) must be at least debounce_ms ({})",
                    self.max_wait_ms, self.debounce_ms
                ),
            });
        }
        if self.process_timeout_ms == 0 {
            return Err(TrackerError::Config {
                message: "process_timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Locate the git executable: config, then environment, then `PATH`
    pub fn resolve_git(&self) -> Result<PathBuf> {
        if let Some(path) = &self.git_path {
            return Ok(path.clone());
        }
        if let Some(path) = std::env::var_os(GIT_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        which::which("git").map_err(|_| TrackerError::ToolNotFound {
            program: "git".to_string(),
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn watch_coalesce(&self) -> Duration {
        Duration::from_millis(self.watch_coalesce_ms)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }
}
