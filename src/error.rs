//! Error types and exit codes for repo-tracker

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Main error type for repo-tracker operations
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Directory unavailable: {path}")]
    DirectoryUnavailable { path: String },

    #[error("Invalid working directory: {path} (must be an absolute path)")]
    InvalidPath { path: String },

    #[error("Tracker has no open working directory")]
    NotOpen,

    #[error("Git executable not found: {program}")]
    ToolNotFound { program: String },

    #[error("{command} failed (exit code {code:?}): {stderr}")]
    ToolFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{command} timed out after {timeout:?}")]
    ToolTimeout { command: String, timeout: Duration },

    #[error("Failed to parse git output: {message}")]
    ParseFailure { message: String },

    #[error("Scan failed: {message}")]
    ScanFailed { message: String },

    #[error("Watcher error: {message}")]
    Watch { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure recorded by the tracker, surfaced again to a caller
    #[error(transparent)]
    Recorded(Arc<TrackerError>),
}

impl TrackerError {
    /// Short machine-readable category, used in events and `ScanFailure`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectoryUnavailable { .. } => "directory_unavailable",
            Self::InvalidPath { .. } => "invalid_path",
            Self::NotOpen => "not_open",
            Self::ToolNotFound { .. } | Self::ToolFailed { .. } => "tool_invocation_failed",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::ParseFailure { .. } => "parse_failure",
            Self::ScanFailed { .. } => "scan_failed",
            Self::Watch { .. } => "watch",
            Self::Config { .. } => "config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Recorded(inner) => inner.kind(),
        }
    }

    /// Whether git reported that the directory is not inside a repository.
    ///
    /// The tracker turns this into a non-repository snapshot instead of a
    /// scan failure.
    pub fn is_not_repository(&self) -> bool {
        match self {
            Self::ToolFailed { stderr, .. } => stderr.to_lowercase().contains("not a git repository"),
            Self::Recorded(inner) => inner.is_not_repository(),
            _ => false,
        }
    }

    /// Convert error to CLI exit code:
    /// - 1: Path / IO error
    /// - 2: Configuration error
    /// - 3: Parse failure
    /// - 5: Git invocation error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::DirectoryUnavailable { .. } => ExitCode::from(1),
            Self::InvalidPath { .. } => ExitCode::from(1),
            Self::NotOpen => ExitCode::from(1),
            Self::Watch { .. } => ExitCode::from(1),
            Self::Io(_) => ExitCode::from(1),
            Self::Serialization(_) => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::ParseFailure { .. } => ExitCode::from(3),
            Self::ToolNotFound { .. } => ExitCode::from(5),
            Self::ToolFailed { .. } => ExitCode::from(5),
            Self::ToolTimeout { .. } => ExitCode::from(5),
            Self::ScanFailed { .. } => ExitCode::from(5),
            Self::Recorded(inner) => inner.exit_code(),
        }
    }
}

/// Result type alias for repo-tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
