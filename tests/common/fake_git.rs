//! In-process stand-in for the git CLI
//!
//! Answers `status` with canned porcelain output per directory, creates
//! `.git` on `init`, and can hold status calls for a directory open until
//! released, which lets tests interleave open/close with a scan in flight.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use repo_tracker::{ProcessOutput, ProcessRunner, Result};

#[derive(Default)]
struct State {
    outputs: HashMap<PathBuf, String>,
    status_calls: HashMap<PathBuf, usize>,
    init_calls: usize,
    held: HashSet<PathBuf>,
    in_flight: usize,
    failure: Option<ProcessOutput>,
}

pub struct FakeGit {
    state: Mutex<State>,
    changed: Condvar,
}

/// Output for a directory without a canned response
pub const DEFAULT_STATUS: &str = "## main\0";

impl FakeGit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
        })
    }

    /// Canned `status` output for `dir`
    pub fn set_output(&self, dir: &Path, raw: &str) {
        self.state
            .lock()
            .outputs
            .insert(dir.to_path_buf(), raw.to_string());
    }

    /// Block status calls for `dir` until [`release`](Self::release)
    pub fn hold(&self, dir: &Path) {
        self.state.lock().held.insert(dir.to_path_buf());
    }

    pub fn release(&self, dir: &Path) {
        self.state.lock().held.remove(dir);
        self.changed.notify_all();
    }

    /// Make every status call fail with `stderr`
    pub fn fail_with(&self, stderr: &str, code: i32) {
        self.state.lock().failure = Some(ProcessOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            code: Some(code),
        });
    }

    pub fn clear_failure(&self) {
        self.state.lock().failure = None;
    }

    pub fn status_calls(&self, dir: &Path) -> usize {
        self.state.lock().status_calls.get(dir).copied().unwrap_or(0)
    }

    pub fn total_status_calls(&self) -> usize {
        self.state.lock().status_calls.values().sum()
    }

    pub fn init_calls(&self) -> usize {
        self.state.lock().init_calls
    }

    /// Wait until at least `count` status calls are blocked in [`hold`](Self::hold)
    pub fn wait_for_in_flight(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.in_flight < count {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.in_flight >= count;
            }
        }
        true
    }

    fn ok(stdout: String) -> ProcessOutput {
        ProcessOutput {
            stdout,
            stderr: String::new(),
            code: Some(0),
        }
    }
}

impl ProcessRunner for FakeGit {
    fn run(&self, args: &[&str], cwd: &Path) -> Result<ProcessOutput> {
        if args.first() == Some(&"init") {
            fs::create_dir_all(cwd.join(".git"))?;
            self.state.lock().init_calls += 1;
            return Ok(Self::ok(format!(
                "Initialized empty Git repository in {}/.git/\n",
                cwd.display()
            )));
        }

        if !args.contains(&"status") {
            return Ok(Self::ok(String::new()));
        }

        let mut state = self.state.lock();
        *state.status_calls.entry(cwd.to_path_buf()).or_insert(0) += 1;
        if state.held.contains(cwd) {
            state.in_flight += 1;
            self.changed.notify_all();
            while state.held.contains(cwd) {
                self.changed.wait(&mut state);
            }
            state.in_flight -= 1;
        }

        if let Some(failure) = &state.failure {
            return Ok(failure.clone());
        }
        let stdout = state
            .outputs
            .get(cwd)
            .cloned()
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());
        Ok(Self::ok(stdout))
    }
}
