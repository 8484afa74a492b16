//! Tracker events as JSON Lines
//!
//! The `watch` command streams these to stdout so another process (an editor
//! plugin, a shell prompt) can follow the tracker without linking to it.
//!
//! # Event Format
//!
//! All events are JSON objects on a single line:
//! ```json
//! {"type":"snapshot","generated_at":3,"prompt":"main:  +1 ~0 -0 !0",...}
//! ```
//!
//! # Event Types
//!
//! - `snapshot` - A scan completed and produced a new snapshot
//! - `scan_failed` - A scan failed; the previous snapshot is still current
//! - `tracker_status` - The tracker started or stopped following a directory

use std::io::{self, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;

use crate::model::{Branch, FileStatusEntry, Snapshot, StatusSummary};
use crate::tracker::ScanFailure;

/// Event emitter writing one JSON object per line
pub struct EventEmitter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl EventEmitter {
    /// Emit to stdout
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Emit an event as JSON
    pub fn emit<E: TrackerEvent>(&self, event: &E) {
        let wrapper = EventWrapper {
            event_type: E::event_type(),
            payload: event,
        };

        match serde_json::to_string(&wrapper) {
            Ok(json) => {
                let mut writer = self.writer.lock();
                // Ignore write errors (reader may have gone away)
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
            Err(e) => tracing::error!("Failed to serialize {} event: {}", E::event_type(), e),
        }
    }
}

/// Wrapper for events with type field
#[derive(Serialize)]
struct EventWrapper<'a, P: Serialize> {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(flatten)]
    payload: &'a P,
}

/// Trait for tracker events
pub trait TrackerEvent: Serialize {
    fn event_type() -> &'static str;
}

// ============================================================================
// Event Types
// ============================================================================

/// Event emitted for each delivered snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEvent {
    pub generated_at: u64,
    pub epoch: u64,
    pub working_directory: Option<String>,
    pub is_repository: bool,
    pub branch: Option<Branch>,
    pub summary: StatusSummary,
    /// Toolbar-style one-liner
    pub prompt: String,
    pub files: Vec<FileStatusEntry>,
    /// Timestamp (ISO 8601)
    pub timestamp: String,
}

impl TrackerEvent for SnapshotEvent {
    fn event_type() -> &'static str {
        "snapshot"
    }
}

impl SnapshotEvent {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            generated_at: snapshot.generated_at,
            epoch: snapshot.epoch,
            working_directory: snapshot
                .working_directory
                .as_ref()
                .map(|p| p.display().to_string()),
            is_repository: snapshot.is_repository,
            branch: snapshot.branch.clone(),
            summary: snapshot.summary(),
            prompt: snapshot.prompt(),
            files: snapshot.files.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Event emitted when a scan fails
#[derive(Debug, Clone, Serialize)]
pub struct ScanFailedEvent {
    pub kind: String,
    pub message: String,
    pub working_directory: Option<String>,
    pub timestamp: String,
}

impl TrackerEvent for ScanFailedEvent {
    fn event_type() -> &'static str {
        "scan_failed"
    }
}

impl ScanFailedEvent {
    pub fn from_failure(failure: &ScanFailure) -> Self {
        Self {
            kind: failure.kind.to_string(),
            message: failure.message.clone(),
            working_directory: failure
                .working_directory
                .as_ref()
                .map(|p| p.display().to_string()),
            timestamp: failure.at.to_rfc3339(),
        }
    }
}

/// Event emitted when the tracker starts or stops following a directory
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatusEvent {
    /// started, stopped
    pub status: String,
    pub working_directory: String,
    /// Whether filesystem watching is active
    pub watching: bool,
    pub message: Option<String>,
    pub timestamp: String,
}

impl TrackerEvent for TrackerStatusEvent {
    fn event_type() -> &'static str {
        "tracker_status"
    }
}

impl TrackerStatusEvent {
    pub fn started(working_directory: &Path, watching: bool) -> Self {
        Self {
            status: "started".to_string(),
            working_directory: working_directory.display().to_string(),
            watching,
            message: Some(if watching {
                "Tracking with live filesystem watching".to_string()
            } else {
                "Tracking without filesystem watching".to_string()
            }),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn stopped(working_directory: &Path) -> Self {
        Self {
            status: "stopped".to_string(),
            working_directory: working_directory.display().to_string(),
            watching: false,
            message: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
