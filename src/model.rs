//! Snapshot data model
//!
//! Everything a consumer sees is built from these types. A [`Snapshot`] is
//! produced wholesale by a scan and shared as `Arc<Snapshot>`; it is never
//! mutated after publication.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Status category of a single reported path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Not tracked and not ignored
    Untracked,
    /// New in the index, or intent-to-add in the worktree
    Added,
    /// Worktree content differs from the index
    Modified,
    /// Index content differs from HEAD
    Staged,
    /// Removed from the worktree, still in the index
    Deleted,
    /// Removal staged in the index
    Removed,
    /// Rename staged in the index
    Renamed,
    /// Unmerged path
    Conflict,
    /// Matched by an ignore rule
    Ignored,
    /// Status code the parser does not know
    Unrecognized,
}

impl FileStatus {
    /// Get a human-readable description
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untracked => "untracked",
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Staged => "staged",
            Self::Deleted => "deleted",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
            Self::Conflict => "conflict",
            Self::Ignored => "ignored",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported path and its status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatusEntry {
    /// Path relative to the working directory, `/`-separated
    pub path: String,
    /// Status category
    pub status: FileStatus,
    /// Previous path, for `Renamed` entries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
    /// Raw two-letter code, kept for `Unrecognized` entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FileStatusEntry {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
            original_path: None,
            code: None,
        }
    }

    pub fn renamed(path: impl Into<String>, original_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: FileStatus::Renamed,
            original_path: Some(original_path.into()),
            code: None,
        }
    }

    pub fn unrecognized(path: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: FileStatus::Unrecognized,
            original_path: None,
            code: Some(code.into()),
        }
    }
}

/// Branch identity of a repository with a symbolic HEAD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Local branch name
    pub name: String,
    /// Whether a live upstream is configured
    pub has_upstream: bool,
    /// Upstream ref as reported by git (e.g. `origin/main`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    /// Commits on the local branch not on upstream
    pub ahead: u32,
    /// Commits on upstream not on the local branch
    pub behind: u32,
}

impl BranchInfo {
    /// Branch without an upstream
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_upstream: false,
            upstream: None,
            ahead: 0,
            behind: 0,
        }
    }
}

/// Branch state: a named branch or a detached HEAD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Branch {
    Named(BranchInfo),
    Detached,
}

impl Branch {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(info) => Some(&info.name),
            Self::Detached => None,
        }
    }

    pub fn info(&self) -> Option<&BranchInfo> {
        match self {
            Self::Named(info) => Some(info),
            Self::Detached => None,
        }
    }
}

/// Immutable point-in-time summary of repository status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whether the working directory holds git metadata
    pub is_repository: bool,
    /// Directory this snapshot describes, absent when the tracker is closed
    pub working_directory: Option<PathBuf>,
    /// Branch identity, absent for non-repositories
    pub branch: Option<Branch>,
    /// Reported paths in git's order
    pub files: Vec<FileStatusEntry>,
    /// Strictly increasing per tracker
    pub generated_at: u64,
    /// Lifecycle segment (bumped on every open/close) this snapshot belongs to
    pub epoch: u64,
}

impl Snapshot {
    /// Snapshot of a closed tracker
    pub fn empty(generated_at: u64, epoch: u64) -> Self {
        Self {
            is_repository: false,
            working_directory: None,
            branch: None,
            files: Vec::new(),
            generated_at,
            epoch,
        }
    }

    /// Snapshot of an open directory that is not a repository
    pub fn not_repository(working_directory: PathBuf, generated_at: u64, epoch: u64) -> Self {
        Self {
            working_directory: Some(working_directory),
            ..Self::empty(generated_at, epoch)
        }
    }

    pub fn repository(
        working_directory: PathBuf,
        branch: Branch,
        files: Vec<FileStatusEntry>,
        generated_at: u64,
        epoch: u64,
    ) -> Self {
        Self {
            is_repository: true,
            working_directory: Some(working_directory),
            branch: Some(branch),
            files,
            generated_at,
            epoch,
        }
    }

    pub fn branch_name(&self) -> Option<&str> {
        self.branch.as_ref().and_then(Branch::name)
    }

    /// Entries with the given status
    pub fn files_with_status(&self, status: FileStatus) -> impl Iterator<Item = &FileStatusEntry> {
        self.files.iter().filter(move |entry| entry.status == status)
    }

    /// Counts grouped the way the toolbar prompt shows them
    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for entry in &self.files {
            match entry.status {
                FileStatus::Untracked | FileStatus::Added => summary.added += 1,
                FileStatus::Modified | FileStatus::Staged => summary.modified += 1,
                FileStatus::Deleted | FileStatus::Removed => summary.deleted += 1,
                FileStatus::Conflict => summary.conflicted += 1,
                FileStatus::Renamed | FileStatus::Ignored | FileStatus::Unrecognized => {}
            }
        }
        summary
    }

    /// One-line prompt, e.g. `main:  +2 ~1 -1 !0`
    pub fn prompt(&self) -> String {
        if !self.is_repository {
            return "(no git repository)".to_string();
        }
        let label = match &self.branch {
            Some(Branch::Named(info)) => info.name.as_str(),
            Some(Branch::Detached) | None => "(detached)",
        };
        format!("{}:  {}", label, self.summary())
    }
}

/// Per-category counts for a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub conflicted: usize,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} -{} !{}",
            self.added, self.modified, self.deleted, self.conflicted
        )
    }
}
