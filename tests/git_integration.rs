//! End-to-end tests against the real git CLI and filesystem watcher
//!
//! Skipped when no `git` executable is on PATH.
//!
//! Run with: cargo test --test git_integration

mod common;

use std::time::Duration;

use common::{fast_config, git_available, Collector, TestRepo};
use repo_tracker::{FileStatus, RepositoryTracker, TrackerConfig};

const WAIT: Duration = Duration::from_secs(10);

macro_rules! require_git {
    () => {
        if !git_available() {
            eprintln!("Skipping: git not found on PATH");
            return;
        }
    };
}

fn committed_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.init_git()
        .add_file("keep.txt", "keep\n")
        .add_file("edit.txt", "before\n")
        .add_file("drop.txt", "drop\n")
        .commit("initial");
    repo
}

#[test]
fn test_status_of_real_repository() {
    require_git!();
    let repo = committed_repo();
    repo.add_file("new_one.txt", "1\n")
        .add_file("dir/new_two.txt", "2\n")
        .add_file("edit.txt", "after\n")
        .remove_file("drop.txt");

    let tracker = RepositoryTracker::new(fast_config()).unwrap();
    let snapshots = Collector::attach(&tracker);
    tracker.open(repo.path()).unwrap();

    let snapshot = snapshots.expect(WAIT);
    assert!(snapshot.is_repository, "{:?}", tracker.last_error());
    assert_eq!(snapshot.branch_name(), Some("main"));

    let untracked: Vec<_> = snapshot
        .files_with_status(FileStatus::Untracked)
        .map(|e| e.path.as_str())
        .collect();
    assert_eq!(untracked.len(), 2);
    assert!(untracked.contains(&"dir/new_two.txt"));
    assert_eq!(snapshot.files_with_status(FileStatus::Modified).count(), 1);
    assert_eq!(snapshot.files_with_status(FileStatus::Deleted).count(), 1);
    assert_eq!(snapshot.prompt(), "main:  +2 ~1 -1 !0");
}

#[test]
fn test_staged_rename_reported_once() {
    require_git!();
    let repo = committed_repo();
    repo.git(&["mv", "keep.txt", "kept.txt"]);

    let tracker = RepositoryTracker::new(fast_config()).unwrap();
    let snapshots = Collector::attach(&tracker);
    tracker.open(repo.path()).unwrap();

    let snapshot = snapshots.expect(WAIT);
    let renamed: Vec<_> = snapshot.files_with_status(FileStatus::Renamed).collect();
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].path, "kept.txt");
    assert_eq!(renamed[0].original_path.as_deref(), Some("keep.txt"));
}

#[test]
fn test_unborn_branch_has_name() {
    require_git!();
    let repo = TestRepo::new();
    repo.init_git().add_file("a.txt", "a\n");

    let tracker = RepositoryTracker::new(fast_config()).unwrap();
    let snapshots = Collector::attach(&tracker);
    tracker.open(repo.path()).unwrap();

    let snapshot = snapshots.expect(WAIT);
    assert!(snapshot.is_repository);
    assert_eq!(snapshot.branch_name(), Some("main"));
    assert_eq!(snapshot.files.len(), 1);
}

#[test]
fn test_init_real_directory() {
    require_git!();
    let repo = TestRepo::new();
    repo.add_file("readme.md", "# hi\n");

    let tracker = RepositoryTracker::new(fast_config()).unwrap();
    let snapshots = Collector::attach(&tracker);
    tracker.open(repo.path()).unwrap();
    assert!(!snapshots.expect(WAIT).is_repository);

    tracker.init().unwrap();
    let snapshot = snapshots.wait_for(WAIT, |s| s.is_repository);
    assert_eq!(snapshot.files_with_status(FileStatus::Untracked).count(), 1);
}

#[test]
fn test_filesystem_change_triggers_rescan() {
    require_git!();
    let repo = committed_repo();

    let config = TrackerConfig {
        watch_filesystem: true,
        ..fast_config()
    };
    let tracker = RepositoryTracker::new(config).unwrap();
    let snapshots = Collector::attach(&tracker);
    tracker.open(repo.path()).unwrap();

    let clean = snapshots.expect(WAIT);
    assert!(clean.files.is_empty());
    assert!(tracker.is_watching());

    repo.add_file("fresh.txt", "new\n");
    let snapshot = snapshots.wait_for(WAIT, |s| {
        s.files.iter().any(|e| e.path == "fresh.txt")
    });
    assert_eq!(snapshot.files[0].status, FileStatus::Untracked);
}

#[test]
fn test_cli_status_json() {
    require_git!();
    let repo = committed_repo();
    repo.add_file("new.txt", "n\n");

    let stdout = repo.run_cli_success(&["status", "--format", "json"]);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["is_repository"], true);
    assert_eq!(json["branch"]["name"], "main");
    assert_eq!(json["summary"]["added"], 1);
}

#[test]
fn test_cli_status_outside_repository() {
    require_git!();
    let dir = TestRepo::new();
    dir.add_file("x.txt", "x");

    let stdout = dir.run_cli_success(&["status"]);
    assert!(stdout.contains("(no git repository)"), "{}", stdout);
}
