//! repo-tracker: live git working-directory status
//!
//! This library keeps an always-current [`Snapshot`] of one git working
//! directory: branch, upstream divergence and per-file status. Filesystem
//! changes are debounced into rescans driven by the git CLI, stale results
//! from a previous binding are never delivered, and subscribers are notified
//! on the execution context the host chooses.
//!
//! # Example
//!
//! ```ignore
//! use repo_tracker::{RepositoryTracker, TrackerConfig};
//!
//! let tracker = RepositoryTracker::new(TrackerConfig::default())?;
//! tracker.subscribe(|snapshot| println!("{}", snapshot.prompt()));
//! tracker.open("/path/to/checkout")?;
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod model;
pub mod notifier;
pub mod tracker;
pub mod watcher;

// Re-export commonly used types
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{LoggingConfig, TrackerConfig};
pub use error::{Result, TrackerError};
pub use events::{EventEmitter, ScanFailedEvent, SnapshotEvent, TrackerEvent, TrackerStatusEvent};
pub use git::{GitCli, ProcessOutput, ProcessRunner};
pub use model::{Branch, BranchInfo, FileStatus, FileStatusEntry, Snapshot, StatusSummary};
pub use notifier::{
    queue_dispatcher, ChangeNotifier, DispatchQueue, Dispatcher, InlineDispatcher,
    QueueDispatcher, SubscriptionToken, ThreadDispatcher,
};
pub use tracker::{RepositoryTracker, ScanFailure, TrackerPhase, TrackerStats};
pub use watcher::{DirectoryWatcher, WatchSignal, WatcherConfig, WatcherHandle};
