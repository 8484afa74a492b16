//! Watch command handler - stream snapshots as a working directory changes
//!
//! Snapshots are delivered through a queue drained on the main thread, so
//! output is written from one place in publication order.
//!
//! The `stopped` status event is emitted only when `--count` ends the loop.
//! Without it the command runs until the process is killed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{OutputFormat, WatchArgs};
use crate::commands::{format_snapshot_text, CommandContext};
use crate::error::Result;
use crate::events::{EventEmitter, ScanFailedEvent, SnapshotEvent, TrackerStatusEvent};
use crate::git::GitCli;
use crate::notifier::queue_dispatcher;
use crate::tracker::RepositoryTracker;
use crate::TrackerConfig;

/// How often the main loop checks for failures between deliveries
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run the watch command
pub fn run_watch(args: &WatchArgs, ctx: &CommandContext) -> Result<String> {
    let dir = ctx.working_directory(&args.path)?;
    let mut config = TrackerConfig {
        include_ignored: args.ignored || ctx.config.include_ignored,
        ..ctx.config.clone()
    };
    if let Some(debounce_ms) = args.debounce_ms {
        config.debounce_ms = debounce_ms;
        config.max_wait_ms = config.max_wait_ms.max(debounce_ms);
    }

    let program = config.resolve_git()?;
    let runner = Arc::new(GitCli::new(program, config.process_timeout()));
    let (dispatcher, queue) = queue_dispatcher();
    let tracker = RepositoryTracker::with_parts(config, runner, Arc::new(dispatcher))?;

    let emitter = Arc::new(EventEmitter::stdout());
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let emitter = Arc::clone(&emitter);
        let delivered = Arc::clone(&delivered);
        let format = ctx.format;
        tracker.subscribe(move |snapshot| {
            delivered.fetch_add(1, Ordering::SeqCst);
            match format {
                OutputFormat::Json => emitter.emit(&SnapshotEvent::from_snapshot(snapshot)),
                OutputFormat::Text => println!("{}", format_snapshot_text(snapshot)),
            }
        });
    }

    tracker.open(&dir)?;
    if ctx.format == OutputFormat::Json {
        emitter.emit(&TrackerStatusEvent::started(&dir, tracker.is_watching()));
    } else if ctx.verbose {
        eprintln!(
            "Watching {} (filesystem events: {})",
            dir.display(),
            if tracker.is_watching() { "on" } else { "off" }
        );
    }

    let mut last_failure = None;
    loop {
        queue.run_next_timeout(POLL_INTERVAL);
        queue.run_pending();

        if let Some(limit) = args.count {
            if delivered.load(Ordering::SeqCst) >= limit {
                break;
            }
        }

        let failure = tracker.last_error();
        if failure.is_some() && failure != last_failure {
            if let Some(failure) = &failure {
                match ctx.format {
                    OutputFormat::Json => emitter.emit(&ScanFailedEvent::from_failure(failure)),
                    OutputFormat::Text => eprintln!("scan failed: {}", failure.message),
                }
            }
        }
        last_failure = failure;
    }

    // Skip the closing empty snapshot; the status event says enough
    tracker.close();
    if ctx.format == OutputFormat::Json {
        emitter.emit(&TrackerStatusEvent::stopped(&dir));
    }
    Ok(String::new())
}
