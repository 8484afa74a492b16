//! Repository detection, initialization and status queries

use std::path::{Path, PathBuf};

use super::{git_command, parse_status, ParsedStatus, ProcessRunner, METADATA_DIR};
use crate::error::Result;

/// Outcome of querying a working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoStatus {
    /// No git metadata, or git says so
    NotRepository,
    /// Parsed branch and file status
    Repository(ParsedStatus),
}

/// Check whether `dir` itself carries git metadata.
///
/// `.git` is a directory for ordinary clones and a file for linked worktrees
/// and submodules; both count.
pub fn has_git_metadata(dir: &Path) -> bool {
    dir.join(METADATA_DIR).exists()
}

/// Walk up from `start` to the nearest directory carrying git metadata
pub fn discover_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| has_git_metadata(dir))
        .map(Path::to_path_buf)
}

/// Arguments for the status query
fn status_args(include_ignored: bool) -> Vec<&'static str> {
    let mut args = vec![
        // Never take the index lock or refresh stat info: the watcher would
        // see our own writes and schedule another scan.
        "--no-optional-locks",
        "status",
        "--porcelain=v1",
        "--branch",
        "-z",
        "--untracked-files=all",
    ];
    if include_ignored {
        args.push("--ignored");
    }
    args
}

/// Query branch and file status for `dir`
pub fn query_status(
    runner: &dyn ProcessRunner,
    dir: &Path,
    include_ignored: bool,
) -> Result<RepoStatus> {
    if !has_git_metadata(dir) {
        return Ok(RepoStatus::NotRepository);
    }

    match git_command(runner, &status_args(include_ignored), dir) {
        Ok(raw) => Ok(RepoStatus::Repository(parse_status(&raw)?)),
        Err(e) if e.is_not_repository() => {
            tracing::debug!("[GIT] {} is not a repository: {}", dir.display(), e);
            Ok(RepoStatus::NotRepository)
        }
        Err(e) => Err(e),
    }
}

/// Create repository metadata at `dir`
pub fn init_repository(runner: &dyn ProcessRunner, dir: &Path) -> Result<()> {
    let output = git_command(runner, &["init"], dir)?;
    tracing::info!("[GIT] {}", output.trim());
    Ok(())
}
