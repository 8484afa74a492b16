//! Repository state tracker
//!
//! [`RepositoryTracker`] binds to one working directory at a time, turns
//! change signals into debounced rescans, and publishes each resulting
//! [`Snapshot`] through its [`ChangeNotifier`].
//!
//! # State machine
//!
//! ```text
//!            open                 scan due              scan done
//! Closed ──────────> Opening ──────────────> Scanning ─────────────> Idle
//!   ^                  ^                        ^                      │
//!   │ close            │ open                   └──────────────────────┘
//!   └──────────────────┴──────── (any state)          signal / refresh
//! ```
//!
//! # Scheduling
//!
//! All scans, and `git init`, run on one worker thread per tracker, so at
//! most one scan is ever in flight. Callers only flip flags under the
//! control lock and wake the worker:
//!
//! - a change signal starts or extends a burst; the scan runs once the burst
//!   has been quiet for `debounce`, or `max_wait` after it began;
//! - `force_refresh` asks for an immediate scan, or for one rerun after the
//!   scan currently in flight;
//! - `open`/`close` bump the epoch. A scan captures the epoch when it starts
//!   and its result is dropped if the epoch moved on.
//!
//! # Locking
//!
//! `control` is never held across I/O or subscriber callbacks. The current
//! snapshot is swapped while `control` is held so readers and the epoch
//! agree on which segment it belongs to.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::git::{self, GitCli, ProcessRunner, RepoStatus};
use crate::model::Snapshot;
use crate::notifier::{ChangeNotifier, Dispatcher, InlineDispatcher, SubscriptionToken};
use crate::watcher::{DirectoryWatcher, WatchSignal, WatcherConfig, WatcherHandle};

/// Lifecycle phase of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerPhase {
    Closed,
    Opening,
    Idle,
    Scanning,
}

/// Counters for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub scans_started: u64,
    pub scans_completed: u64,
    pub scans_failed: u64,
    /// Scans whose result was dropped because open/close superseded them
    pub discarded: u64,
}

/// Most recent recoverable failure
#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub kind: &'static str,
    pub message: String,
    pub working_directory: Option<PathBuf>,
    pub at: DateTime<Utc>,
    #[serde(skip)]
    error: Arc<TrackerError>,
}

impl ScanFailure {
    fn new(error: TrackerError, working_directory: Option<PathBuf>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            working_directory,
            at: Utc::now(),
            error: Arc::new(error),
        }
    }

    /// The underlying error
    pub fn error(&self) -> &TrackerError {
        &self.error
    }

    /// The underlying error, shareable as a return value
    pub fn to_error(&self) -> TrackerError {
        TrackerError::Recorded(Arc::clone(&self.error))
    }
}

impl PartialEq for ScanFailure {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.message == other.message
            && self.working_directory == other.working_directory
            && self.at == other.at
    }
}

impl Eq for ScanFailure {}

/// A changed-paths burst awaiting its rescan
#[derive(Debug, Clone, Copy)]
struct Burst {
    first: Instant,
    last: Instant,
}

/// Work picked by the worker
struct ScanJob {
    dir: PathBuf,
    epoch: u64,
    init: bool,
}

enum Next {
    Run(ScanJob),
    WaitUntil(Instant),
    Wait,
}

struct Control {
    phase: TrackerPhase,
    working_dir: Option<PathBuf>,
    epoch: u64,
    /// Last `generated_at` handed out
    generation: u64,
    no_refresh: bool,
    /// A signal arrived while `no_refresh` was set
    suppressed: bool,
    burst: Option<Burst>,
    immediate: bool,
    rerun: bool,
    init_requested: bool,
    watcher: Option<WatcherHandle>,
    last_error: Option<ScanFailure>,
    stats: TrackerStats,
    shutdown: bool,
}

impl Control {
    fn new() -> Self {
        Self {
            phase: TrackerPhase::Closed,
            working_dir: None,
            epoch: 0,
            generation: 0,
            no_refresh: false,
            suppressed: false,
            burst: None,
            immediate: false,
            rerun: false,
            init_requested: false,
            watcher: None,
            last_error: None,
            stats: TrackerStats::default(),
            shutdown: false,
        }
    }

    /// Forget all scheduling state of the previous segment
    fn reset_schedule(&mut self) {
        self.suppressed = false;
        self.burst = None;
        self.immediate = false;
        self.rerun = false;
        self.init_requested = false;
    }

    /// Record a change signal; false if suppressed by `no_refresh`
    fn note_change(&mut self, now: Instant) -> bool {
        if self.no_refresh {
            self.suppressed = true;
            return false;
        }
        match &mut self.burst {
            Some(burst) => burst.last = now,
            None => {
                self.burst = Some(Burst {
                    first: now,
                    last: now,
                })
            }
        }
        true
    }

    /// Decide what the worker does next
    fn next(&mut self, config: &TrackerConfig, now: Instant) -> Next {
        if matches!(self.phase, TrackerPhase::Closed | TrackerPhase::Scanning) {
            return Next::Wait;
        }
        let Some(dir) = self.working_dir.clone() else {
            return Next::Wait;
        };

        let burst_due = match (self.burst, self.no_refresh) {
            (Some(burst), false) => {
                let due = (burst.last + config.debounce()).min(burst.first + config.max_wait());
                if now < due {
                    if !(self.immediate || self.init_requested) {
                        return Next::WaitUntil(due);
                    }
                    false
                } else {
                    true
                }
            }
            _ => false,
        };

        if !(self.immediate || self.init_requested || burst_due) {
            return Next::Wait;
        }

        let init = std::mem::take(&mut self.init_requested);
        self.immediate = false;
        // The scan about to run covers every change seen so far
        self.burst = None;
        self.phase = TrackerPhase::Scanning;
        self.stats.scans_started += 1;
        Next::Run(ScanJob {
            dir,
            epoch: self.epoch,
            init,
        })
    }
}

struct Shared {
    config: TrackerConfig,
    runner: Arc<dyn ProcessRunner>,
    notifier: ChangeNotifier,
    control: Mutex<Control>,
    wake: Condvar,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Mirror of `Control::epoch` readable without the lock
    epoch: Arc<AtomicU64>,
}

impl Shared {
    fn worker_loop(self: Arc<Self>) {
        loop {
            let job = {
                let mut control = self.control.lock();
                loop {
                    if control.shutdown {
                        return;
                    }
                    match control.next(&self.config, Instant::now()) {
                        Next::Run(job) => break job,
                        Next::WaitUntil(deadline) => {
                            let _ = self.wake.wait_until(&mut control, deadline);
                        }
                        Next::Wait => self.wake.wait(&mut control),
                    }
                }
            };
            self.execute(job);
        }
    }

    fn execute(&self, job: ScanJob) {
        tracing::debug!(
            "[TRACKER] Scanning {} (epoch {})",
            job.dir.display(),
            job.epoch
        );

        let outcome = self.scan(&job);
        let available = job.dir.is_dir();

        let mut control = self.control.lock();
        if control.epoch != job.epoch {
            control.stats.discarded += 1;
            tracing::debug!(
                "[TRACKER] Discarding stale scan of {} (epoch {} != {})",
                job.dir.display(),
                job.epoch,
                control.epoch
            );
            return;
        }

        control.phase = TrackerPhase::Idle;
        if std::mem::take(&mut control.rerun) {
            control.immediate = true;
        }

        match outcome {
            Ok(status) => {
                control.generation += 1;
                let snapshot = Arc::new(match status {
                    RepoStatus::Repository(parsed) => Snapshot::repository(
                        job.dir.clone(),
                        parsed.branch,
                        parsed.entries,
                        control.generation,
                        job.epoch,
                    ),
                    RepoStatus::NotRepository => {
                        Snapshot::not_repository(job.dir.clone(), control.generation, job.epoch)
                    }
                });
                *self.snapshot.write() = Arc::clone(&snapshot);
                control.stats.scans_completed += 1;
                // A vanished directory is reported as a non-repository and
                // stays recorded as the reason
                control.last_error = (!available).then(|| {
                    ScanFailure::new(
                        TrackerError::DirectoryUnavailable {
                            path: job.dir.display().to_string(),
                        },
                        Some(job.dir.clone()),
                    )
                });
                drop(control);

                tracing::info!(
                    "[TRACKER] Snapshot {} for {}: {}",
                    snapshot.generated_at,
                    job.dir.display(),
                    snapshot.prompt()
                );
                self.publish(snapshot, job.epoch);
            }
            Err(e) => {
                tracing::warn!(
                    "[TRACKER] Scan of {} failed, keeping previous snapshot: {}",
                    job.dir.display(),
                    e
                );
                control.stats.scans_failed += 1;
                control.last_error = Some(ScanFailure::new(e, Some(job.dir.clone())));
            }
        }
    }

    fn scan(&self, job: &ScanJob) -> Result<RepoStatus> {
        if !job.dir.is_dir() {
            tracing::info!(
                "[TRACKER] {} is unavailable; reporting no repository",
                job.dir.display()
            );
            return Ok(RepoStatus::NotRepository);
        }
        if job.init {
            git::init_repository(self.runner.as_ref(), &job.dir)?;
        }
        git::query_status(self.runner.as_ref(), &job.dir, self.config.include_ignored)
    }

    fn publish(&self, snapshot: Arc<Snapshot>, epoch: u64) {
        let current = Arc::clone(&self.epoch);
        self.notifier
            .publish(snapshot, move || current.load(Ordering::SeqCst) == epoch);
    }

    fn on_watch_signal(&self, epoch: u64, signal: WatchSignal) {
        let mut control = self.control.lock();
        if control.epoch != epoch || control.phase == TrackerPhase::Closed {
            return;
        }

        match signal {
            WatchSignal::Changed { paths } => {
                tracing::debug!("[TRACKER] {} paths changed", paths.len());
                if control.note_change(Instant::now()) {
                    self.wake.notify_all();
                }
            }
            WatchSignal::Lost { reason } => {
                let error = TrackerError::DirectoryUnavailable {
                    path: control
                        .working_dir
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                };
                tracing::warn!("[TRACKER] Watcher stopped: {}", reason);
                control.last_error = Some(ScanFailure::new(error, control.working_dir.clone()));
                let watcher = control.watcher.take();
                // Rescan now: the missing directory yields a non-repository snapshot
                control.immediate = true;
                self.wake.notify_all();
                drop(control);
                drop(watcher);
            }
        }
    }

    fn start_watcher(self: &Arc<Self>, dir: &Path, epoch: u64) -> Result<WatcherHandle> {
        let config = WatcherConfig {
            coalesce: self.config.watch_coalesce(),
            // Ignored files are not in the status unless asked for
            respect_gitignore: !self.config.include_ignored,
            ..WatcherConfig::default()
        };
        let weak: Weak<Shared> = Arc::downgrade(self);
        DirectoryWatcher::with_config(dir.to_path_buf(), config).start(move |signal| {
            if let Some(shared) = weak.upgrade() {
                shared.on_watch_signal(epoch, signal);
            }
        })
    }
}

/// Tracks the git status of one working directory at a time
pub struct RepositoryTracker {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RepositoryTracker {
    /// Create a tracker using the git CLI and inline delivery
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let program = config.resolve_git()?;
        let runner = Arc::new(GitCli::new(program, config.process_timeout()));
        Self::with_parts(config, runner, Arc::new(InlineDispatcher))
    }

    /// Create a tracker with an explicit process runner and delivery context
    pub fn with_parts(
        config: TrackerConfig,
        runner: Arc<dyn ProcessRunner>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            config,
            runner,
            notifier: ChangeNotifier::new(dispatcher),
            control: Mutex::new(Control::new()),
            wake: Condvar::new(),
            snapshot: RwLock::new(Arc::new(Snapshot::empty(0, 0))),
            epoch: Arc::new(AtomicU64::new(0)),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("repo-tracker".to_string())
            .spawn(move || worker_shared.worker_loop())?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Bind to `path`, replacing any previous binding, and schedule a scan
    pub fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(TrackerError::InvalidPath {
                path: path.display().to_string(),
            });
        }
        let path = path.to_path_buf();

        let mut control = self.shared.control.lock();
        control.epoch += 1;
        self.shared.epoch.store(control.epoch, Ordering::SeqCst);
        let previous = control.watcher.take();

        control.reset_schedule();
        control.working_dir = Some(path.clone());
        control.phase = TrackerPhase::Opening;
        control.immediate = true;

        if self.shared.config.watch_filesystem {
            match self.shared.start_watcher(&path, control.epoch) {
                Ok(handle) => control.watcher = Some(handle),
                Err(e) => tracing::warn!(
                    "[TRACKER] Not watching {}: {}",
                    path.display(),
                    e
                ),
            }
        }

        tracing::info!(
            "[TRACKER] Opened {} (epoch {})",
            path.display(),
            control.epoch
        );
        self.shared.wake.notify_all();
        drop(control);
        drop(previous);
        Ok(())
    }

    /// Unbind, release the watcher and publish the empty snapshot
    pub fn close(&self) {
        let mut control = self.shared.control.lock();
        control.epoch += 1;
        self.shared.epoch.store(control.epoch, Ordering::SeqCst);
        let watcher = control.watcher.take();

        control.reset_schedule();
        control.working_dir = None;
        control.phase = TrackerPhase::Closed;
        control.generation += 1;

        let snapshot = Arc::new(Snapshot::empty(control.generation, control.epoch));
        *self.shared.snapshot.write() = Arc::clone(&snapshot);
        let epoch = control.epoch;
        tracing::info!("[TRACKER] Closed (epoch {})", epoch);
        drop(control);
        drop(watcher);

        self.shared.publish(snapshot, epoch);
    }

    /// Scan now, bypassing the debounce window.
    ///
    /// While a scan is in flight this only marks it to run once more
    /// afterwards, however many times it is called.
    pub fn force_refresh(&self) {
        let mut control = self.shared.control.lock();
        match control.phase {
            TrackerPhase::Closed => {
                tracing::debug!("[TRACKER] Refresh requested while closed; ignoring");
                return;
            }
            TrackerPhase::Scanning => control.rerun = true,
            TrackerPhase::Opening | TrackerPhase::Idle => control.immediate = true,
        }
        self.shared.wake.notify_all();
    }

    /// Report an external change (e.g. an editor save); same as a watcher signal
    pub fn notify_changed(&self) {
        let mut control = self.shared.control.lock();
        if control.phase == TrackerPhase::Closed {
            return;
        }
        if control.note_change(Instant::now()) {
            self.shared.wake.notify_all();
        }
    }

    /// Pause or resume change-driven scans.
    ///
    /// A scan already running still completes and is delivered. Changes seen
    /// while paused schedule one debounced scan when resumed.
    pub fn set_no_refresh(&self, no_refresh: bool) {
        let mut control = self.shared.control.lock();
        control.no_refresh = no_refresh;
        if !no_refresh && std::mem::take(&mut control.suppressed) {
            control.note_change(Instant::now());
        }
        self.shared.wake.notify_all();
    }

    pub fn is_no_refresh(&self) -> bool {
        self.shared.control.lock().no_refresh
    }

    /// Create repository metadata at the working directory, then rescan
    pub fn init(&self) -> Result<()> {
        let mut control = self.shared.control.lock();
        if control.working_dir.is_none() {
            return Err(TrackerError::NotOpen);
        }
        control.init_requested = true;
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Current snapshot; the empty non-repository value before the first scan
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.snapshot.read())
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&Arc<Snapshot>) + Send + Sync + 'static,
    {
        self.shared.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.notifier.unsubscribe(token)
    }

    pub fn phase(&self) -> TrackerPhase {
        self.shared.control.lock().phase
    }

    pub fn working_directory(&self) -> Option<PathBuf> {
        self.shared.control.lock().working_dir.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self) -> bool {
        self.shared
            .control
            .lock()
            .watcher
            .as_ref()
            .is_some_and(WatcherHandle::is_running)
    }

    pub fn stats(&self) -> TrackerStats {
        self.shared.control.lock().stats
    }

    pub fn last_error(&self) -> Option<ScanFailure> {
        self.shared.control.lock().last_error.clone()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.shared.config
    }
}

impl Drop for RepositoryTracker {
    fn drop(&mut self) {
        let watcher = {
            let mut control = self.shared.control.lock();
            control.shutdown = true;
            control.epoch += 1;
            self.shared.epoch.store(control.epoch, Ordering::SeqCst);
            control.watcher.take()
        };
        self.shared.wake.notify_all();
        drop(watcher);

        if let Some(worker) = self.worker.take() {
            // Dropped from a subscriber running on the worker itself
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
