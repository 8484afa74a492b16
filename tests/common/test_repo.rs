//! TestRepo builder for integration testing
//!
//! Working directories live in a temp dir and can be a real git repository
//! (`init_git`) or carry bare `.git` metadata for use with `FakeGit`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Builder for creating test working directories
pub struct TestRepo {
    dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Create a new empty directory
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        // Resolve symlinked temp roots (/var -> /private/var) so paths compare equal
        let root = dir.path().canonicalize().expect("Failed to canonicalize");
        Self { dir, root }
    }

    /// Get the path to the directory root
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Add a file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.root.join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Delete a file
    pub fn remove_file(&self, relative_path: &str) -> &Self {
        fs::remove_file(self.root.join(relative_path)).expect("Failed to remove file");
        self
    }

    /// Create an empty `.git` directory, enough for the tracker to query git
    pub fn with_fake_metadata(&self) -> &Self {
        fs::create_dir_all(self.root.join(".git")).expect("Failed to create .git");
        self
    }

    /// Run a git command in the directory
    pub fn git(&self, args: &[&str]) -> Output {
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        output
    }

    /// Initialize as a git repository on branch `main`
    pub fn init_git(&self) -> &Self {
        self.git(&["init"]);
        self.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        self.git(&["config", "user.email", "test@test.com"]);
        self.git(&["config", "user.name", "Test User"]);
        self.git(&["config", "commit.gpgsign", "false"]);
        self
    }

    /// Create a git commit with all files
    pub fn commit(&self, message: &str) -> &Self {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
        self
    }

    /// Run the repo-tracker binary in this directory
    pub fn run_cli(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new(env!("CARGO_BIN_EXE_repo-tracker"))
            .current_dir(&self.root)
            .args(args)
            .env("RUST_LOG", "off")
            .output()
    }

    /// Run CLI and expect success, return stdout
    pub fn run_cli_success(&self, args: &[&str]) -> String {
        let output = self.run_cli(args).expect("Failed to run CLI");
        assert!(
            output.status.success(),
            "CLI command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
