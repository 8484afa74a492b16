//! Git integration
//!
//! The tracker talks to git only through a [`ProcessRunner`], using subprocess
//! calls to the git CLI for maximum compatibility. Output is turned into
//! structured records by the pure parser in [`status`].

mod repo;
mod runner;
pub mod status;

pub use repo::{discover_root, has_git_metadata, init_repository, query_status, RepoStatus};
pub use runner::{GitCli, ProcessOutput, ProcessRunner};
pub use status::{parse_branch_header, parse_status, ParsedStatus};

use std::path::Path;

use crate::error::{Result, TrackerError};

/// Name of the metadata entry at the root of a working tree
pub const METADATA_DIR: &str = ".git";

/// Run a git command and return stdout, failing on a non-zero exit
pub fn git_command(runner: &dyn ProcessRunner, args: &[&str], cwd: &Path) -> Result<String> {
    let output = runner.run(args, cwd)?;

    if !output.success() {
        return Err(TrackerError::ToolFailed {
            command: format!("git {}", args.join(" ")),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(output.stdout)
}
