//! Status command handler - scan a working directory once

use crate::cli::{OutputFormat, StatusArgs};
use crate::commands::{format_snapshot_text, scan_timeout, CommandContext, SnapshotWaiter};
use crate::error::Result;
use crate::events::SnapshotEvent;
use crate::tracker::RepositoryTracker;
use crate::TrackerConfig;

/// Run the status command
pub fn run_status(args: &StatusArgs, ctx: &CommandContext) -> Result<String> {
    let dir = ctx.working_directory(&args.path)?;
    let config = TrackerConfig {
        watch_filesystem: false,
        include_ignored: args.ignored || ctx.config.include_ignored,
        ..ctx.config.clone()
    };
    let timeout = scan_timeout(&config);

    let tracker = RepositoryTracker::new(config)?;
    let snapshots = SnapshotWaiter::attach(&tracker);
    tracker.open(&dir)?;
    let epoch = tracker.epoch();
    let snapshot = snapshots.wait_for(&tracker, timeout, |s| s.epoch == epoch)?;
    tracker.close();

    match ctx.format {
        OutputFormat::Text => Ok(format_snapshot_text(&snapshot)),
        OutputFormat::Json => {
            let event = SnapshotEvent::from_snapshot(&snapshot);
            let json = serde_json::to_string_pretty(&event)?;
            Ok(format!("{}\n", json))
        }
    }
}
