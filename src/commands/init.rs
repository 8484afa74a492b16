//! Init command handler - create a repository in a plain directory

use crate::cli::{InitArgs, OutputFormat};
use crate::commands::{format_snapshot_text, scan_timeout, CommandContext, SnapshotWaiter};
use crate::error::Result;
use crate::events::SnapshotEvent;
use crate::git;
use crate::tracker::RepositoryTracker;
use crate::TrackerConfig;

/// Run the init command
pub fn run_init(args: &InitArgs, ctx: &CommandContext) -> Result<String> {
    // Never discover here: init targets exactly the directory given
    let dir = CommandContext {
        discover: false,
        ..ctx.clone()
    }
    .working_directory(&args.path)?;

    if ctx.verbose && git::has_git_metadata(&dir) {
        eprintln!("{} is already a repository", dir.display());
    }

    let config = TrackerConfig {
        watch_filesystem: false,
        ..ctx.config.clone()
    };
    let timeout = scan_timeout(&config);

    let tracker = RepositoryTracker::new(config)?;
    let snapshots = SnapshotWaiter::attach(&tracker);
    tracker.open(&dir)?;
    tracker.init()?;
    let snapshot = snapshots.wait_for(&tracker, timeout, |s| s.is_repository)?;
    tracker.close();

    match ctx.format {
        OutputFormat::Text => Ok(format!(
            "Initialized repository in {}\n{}",
            dir.display(),
            format_snapshot_text(&snapshot)
        )),
        OutputFormat::Json => {
            let event = SnapshotEvent::from_snapshot(&snapshot);
            let json = serde_json::to_string_pretty(&event)?;
            Ok(format!("{}\n", json))
        }
    }
}
