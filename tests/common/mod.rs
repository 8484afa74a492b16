//! Common test utilities and fixtures for repo-tracker integration tests
//!
//! This module provides:
//! - `TestRepo` builder for creating working directories (real git or fake metadata)
//! - `FakeGit` process runner with canned output and scan gating
//! - `Collector` subscriber that forwards snapshots to the test thread

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fake_git;
pub mod collector;
pub mod test_repo;

pub use fake_git::FakeGit;
pub use collector::Collector;
pub use test_repo::TestRepo;

use repo_tracker::TrackerConfig;

/// Config tuned for fast tests: short debounce, no filesystem watching
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        debounce_ms: 100,
        max_wait_ms: 400,
        watch_coalesce_ms: 20,
        process_timeout_ms: 5_000,
        watch_filesystem: false,
        ..TrackerConfig::default()
    }
}

/// Whether a real git executable is available
pub fn git_available() -> bool {
    which::which("git").is_ok()
}
