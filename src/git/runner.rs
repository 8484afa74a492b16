//! Process invocation for the git CLI

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Result, TrackerError};

/// How often a running child is polled for exit
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Captured result of one process invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Invokes the external VCS binary
///
/// Implementations hold no per-call state and may be shared across threads.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, args: &[&str], cwd: &Path) -> Result<ProcessOutput>;
}

/// Runs the real git executable with a bounded wall-clock time
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }
}

impl ProcessRunner for GitCli {
    fn run(&self, args: &[&str], cwd: &Path) -> Result<ProcessOutput> {
        tracing::debug!("[GIT] {} (in {})", self.describe(args), cwd.display());

        let mut child = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TrackerError::ToolNotFound {
                    program: self.program.display().to_string(),
                },
                _ => TrackerError::Io(e),
            })?;

        // Drain both pipes concurrently so a chatty child never blocks on a full pipe
        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    "[GIT] {} timed out after {:?}",
                    self.describe(args),
                    self.timeout
                );
                return Err(TrackerError::ToolTimeout {
                    command: self.describe(args),
                    timeout: self.timeout,
                });
            }
            thread::sleep(WAIT_POLL);
        };

        Ok(ProcessOutput {
            stdout: join_pipe(stdout),
            stderr: join_pipe(stderr),
            code: status.code(),
        })
    }
}

fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
