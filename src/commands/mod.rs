//! Command modules for the repo-tracker CLI
//!
//! Each command module implements a single top-level command:
//! - `status` - One scan, printed once
//! - `watch` - Follow a directory and stream every snapshot
//! - `init` - Create a repository and report its first snapshot
//!
//! All command handlers take their respective `Args` struct from `cli.rs`
//! and a shared `CommandContext` for output format and configuration.

pub mod init;
pub mod status;
pub mod watch;

pub use init::run_init;
pub use status::run_status;
pub use watch::run_watch;

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cli::OutputFormat;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::git;
use crate::model::{FileStatusEntry, Snapshot};
use crate::tracker::RepositoryTracker;

/// Shared context passed to all command handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Output format (text or json)
    pub format: OutputFormat,
    /// Show verbose output
    pub verbose: bool,
    /// Walk up to the enclosing repository root before opening
    pub discover: bool,
    /// Loaded configuration, with CLI overrides applied
    pub config: TrackerConfig,
}

impl Default for CommandContext {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            verbose: false,
            discover: false,
            config: TrackerConfig::default(),
        }
    }
}

impl CommandContext {
    /// Resolve the directory a command should open
    pub fn working_directory(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        if !absolute.is_dir() {
            return Err(TrackerError::DirectoryUnavailable {
                path: absolute.display().to_string(),
            });
        }
        // Canonical form keeps watcher paths and snapshot paths in agreement
        let absolute = absolute.canonicalize()?;

        if self.discover {
            if let Some(root) = git::discover_root(&absolute) {
                if root != absolute {
                    tracing::debug!("[CLI] Discovered repository root {}", root.display());
                }
                return Ok(root);
            }
        }
        Ok(absolute)
    }
}

/// Forwards delivered snapshots to the calling thread
pub(crate) struct SnapshotWaiter {
    receiver: mpsc::Receiver<Arc<Snapshot>>,
}

impl SnapshotWaiter {
    pub(crate) fn attach(tracker: &RepositoryTracker) -> Self {
        let (sender, receiver) = mpsc::channel();
        // Sender is not Sync; subscriber callbacks must be
        let sender = Mutex::new(sender);
        tracker.subscribe(move |snapshot| {
            let _ = sender.lock().send(Arc::clone(snapshot));
        });
        Self { receiver }
    }

    /// Wait for the first snapshot matching `accept`.
    ///
    /// Gives up early with the tracker's recorded scan error, unchanged, so
    /// its exit code survives.
    pub(crate) fn wait_for<F>(
        &self,
        tracker: &RepositoryTracker,
        timeout: Duration,
        accept: F,
    ) -> Result<Arc<Snapshot>>
    where
        F: Fn(&Snapshot) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(TrackerError::ScanFailed {
                    message: format!("no snapshot within {:?}", timeout),
                });
            }
            let slice = (deadline - now).min(Duration::from_millis(50));
            match self.receiver.recv_timeout(slice) {
                Ok(snapshot) if accept(&snapshot) => return Ok(snapshot),
                Ok(_) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if let Some(failure) = tracker.last_error() {
                        return Err(failure.to_error());
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(TrackerError::ScanFailed {
                        message: "tracker stopped".to_string(),
                    });
                }
            }
        }
    }
}

/// How long a one-shot command waits for its scan
pub(crate) fn scan_timeout(config: &TrackerConfig) -> Duration {
    config.process_timeout() * 2 + Duration::from_secs(1)
}

/// Render a snapshot for the terminal
pub fn format_snapshot_text(snapshot: &Snapshot) -> String {
    let mut output = String::new();
    let dir = snapshot
        .working_directory
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());

    output.push_str(&format!("directory: {}\n", dir));
    output.push_str(&format!("status: {}\n", snapshot.prompt()));

    if let Some(info) = snapshot.branch.as_ref().and_then(|b| b.info()) {
        if let Some(upstream) = &info.upstream {
            output.push_str(&format!(
                "upstream: {} (ahead {}, behind {})\n",
                upstream, info.ahead, info.behind
            ));
        }
    }

    if !snapshot.files.is_empty() {
        output.push_str(&format!("files[{}]:\n", snapshot.files.len()));
        for entry in &snapshot.files {
            output.push_str(&format!("  {}\n", format_entry(entry)));
        }
    }
    output
}

fn format_entry(entry: &FileStatusEntry) -> String {
    match (&entry.original_path, &entry.code) {
        (Some(original), _) => format!(
            "{:<12} {} <- {}",
            entry.status.as_str(),
            entry.path,
            original
        ),
        (None, Some(code)) => format!("{:<12} {} [{}]", entry.status.as_str(), entry.path, code),
        (None, None) => format!("{:<12} {}", entry.status.as_str(), entry.path),
    }
}
