//! File system watcher for working directory change signals
//!
//! Uses the `notify` crate to watch the working tree, including the `.git`
//! metadata directory, and turns raw events into [`WatchSignal`]s. The
//! watcher does no scheduling of its own: it reports "something changed"
//! and leaves debouncing of scans to the tracker.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌───────────────────┐
//! │   notify    │────>│  debouncer  │────>│    filter    │────>│ sink(WatchSignal) │
//! │   watcher   │     │   (50ms)    │     │ (lock files, │     │   (tracker)       │
//! │             │     │             │     │  .gitignore) │     │                   │
//! └─────────────┘     └─────────────┘     └──────────────┘     └───────────────────┘
//! ```
//!
//! If the root directory disappears, one terminal [`WatchSignal::Lost`] is
//! sent and the watcher stops. It never retries on its own.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

use crate::error::{Result, TrackerError};
use crate::git::METADATA_DIR;

/// Raw change signal emitted by a running watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// One coalesced batch of changed paths, relative to the root
    Changed { paths: Vec<PathBuf> },
    /// The root became inaccessible; no further signals follow
    Lost { reason: String },
}

/// Configuration for the directory watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// OS event coalescing window (default: 50ms)
    pub coalesce: Duration,
    /// How often the root is checked for liveness while quiet (default: 100ms)
    pub liveness_interval: Duration,
    /// Drop changes to paths ignored by the root `.gitignore` and
    /// `.git/info/exclude` (default: true)
    pub respect_gitignore: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            coalesce: Duration::from_millis(50),
            liveness_interval: Duration::from_millis(100),
            respect_gitignore: true,
        }
    }
}

/// Watches one working directory
pub struct DirectoryWatcher {
    /// Working directory root
    root: PathBuf,
    /// Watcher configuration
    config: WatcherConfig,
}

impl DirectoryWatcher {
    /// Create a new watcher for a working directory
    pub fn new(root: PathBuf) -> Self {
        Self::with_config(root, WatcherConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(root: PathBuf, config: WatcherConfig) -> Self {
        Self { root, config }
    }

    /// Start watching, delivering signals to `sink` on a background thread.
    ///
    /// The returned handle stops the watcher when dropped.
    pub fn start<F>(self, sink: F) -> Result<WatcherHandle>
    where
        F: Fn(WatchSignal) + Send + 'static,
    {
        if !self.root.is_dir() {
            return Err(TrackerError::DirectoryUnavailable {
                path: self.root.display().to_string(),
            });
        }

        let Self { root, config } = self;
        let running = Arc::new(AtomicBool::new(true));

        // Channel for receiving debounced events
        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer(config.coalesce, tx).map_err(|e| TrackerError::Watch {
            message: e.to_string(),
        })?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| TrackerError::Watch {
                message: format!("{}: {}", root.display(), e),
            })?;

        tracing::info!("[WATCHER] Watching {}", root.display());

        // Some backends report canonical paths (e.g. /private/var on macOS)
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());

        let mut ignored = config.respect_gitignore.then(|| load_ignore(&root));

        let handle_running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("repo-tracker-watch".to_string())
            .spawn(move || {
                while handle_running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(config.liveness_interval) {
                        Ok(Ok(events)) => {
                            tracing::debug!("[WATCHER] Received {} raw events", events.len());

                            let rels: Vec<PathBuf> = events
                                .into_iter()
                                .filter(|event| matches!(event.kind, DebouncedEventKind::Any))
                                .filter_map(|event| {
                                    event
                                        .path
                                        .strip_prefix(&root)
                                        .or_else(|_| event.path.strip_prefix(&canonical_root))
                                        .ok()
                                        .map(Path::to_path_buf)
                                })
                                .collect();

                            if ignored.is_some() && rels.iter().any(|rel| is_ignore_source(rel)) {
                                tracing::debug!("[WATCHER] Ignore rules changed; reloading");
                                ignored = Some(load_ignore(&root));
                            }

                            let paths: Vec<PathBuf> = rels
                                .into_iter()
                                .filter(|rel| should_report(rel, &root, ignored.as_ref()))
                                .collect();

                            if !root.is_dir() {
                                report_lost(&sink, &root);
                                break;
                            }

                            if !paths.is_empty() {
                                tracing::debug!("[WATCHER] {} relevant paths changed", paths.len());
                                if handle_running.load(Ordering::SeqCst) {
                                    sink(WatchSignal::Changed { paths });
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            tracing::error!("[WATCHER] Watch error: {:?}", e);
                            if !root.is_dir() {
                                report_lost(&sink, &root);
                                break;
                            }
                        }
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                            if !root.is_dir() {
                                report_lost(&sink, &root);
                                break;
                            }
                        }
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                            break;
                        }
                    }
                }

                handle_running.store(false, Ordering::SeqCst);
                // Keep debouncer alive until thread exits
                drop(debouncer);
                tracing::debug!("[WATCHER] Stopped watching {}", root.display());
            })?;

        Ok(WatcherHandle { running })
    }
}

fn report_lost<F: Fn(WatchSignal)>(sink: &F, root: &Path) {
    tracing::warn!("[WATCHER] Watch root is no longer accessible: {}", root.display());
    sink(WatchSignal::Lost {
        reason: format!("{} is no longer accessible", root.display()),
    });
}

/// Build the matcher for the root `.gitignore` and `.git/info/exclude`.
///
/// Nested `.gitignore` files are not consulted; changes below them still
/// reach the tracker, which only costs a redundant scan.
fn load_ignore(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for source in [
        root.join(".gitignore"),
        root.join(METADATA_DIR).join("info").join("exclude"),
    ] {
        if source.is_file() {
            if let Some(e) = builder.add(&source) {
                tracing::warn!("[WATCHER] Bad ignore rules in {}: {}", source.display(), e);
            }
        }
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!("[WATCHER] Ignore rules unusable, watching everything: {}", e);
        Gitignore::empty()
    })
}

/// Whether `rel` is one of the files `load_ignore` reads
fn is_ignore_source(rel: &Path) -> bool {
    rel == Path::new(".gitignore") || rel == Path::new(METADATA_DIR).join("info").join("exclude")
}

/// Whether a change at `rel` (relative to the root) is worth reporting.
///
/// Lock files and object-store churn are written by git itself while it
/// works, including during our own scans. Ignored paths cannot change the
/// status unless ignored files are being reported.
fn should_report(rel: &Path, root: &Path, ignored: Option<&Gitignore>) -> bool {
    if rel
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lock"))
    {
        return false;
    }

    let mut components = rel.components();
    if let Some(Component::Normal(first)) = components.next() {
        if first == METADATA_DIR {
            return !matches!(components.next(), Some(Component::Normal(second)) if second == "objects");
        }
    }

    match ignored {
        Some(matcher) if !rel.as_os_str().is_empty() => !matcher
            .matched_path_or_any_parents(rel, root.join(rel).is_dir())
            .is_ignore(),
        _ => true,
    }
}

/// Handle for controlling a running watcher
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    /// Stop the watcher
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the watcher is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
