//! Activity log: one JSON line per event.
//!
//! Every autopilot session appends to a `.jsonl` file recording what the
//! loop saw and did: the window it latched onto, each query it made, every
//! answer it typed, and the failures it recovered from. Each line is a
//! self-contained JSON object with an RFC 3339 timestamp.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

/// A structured event in the activity log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: LogEvent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// The loop attached to a window.
    SessionStarted { window: String },
    /// A snapshot was classified and a query is about to be sent.
    QuerySent { state: String, directive: String },
    /// The model produced nothing usable this cycle.
    QuerySkipped { reason: String },
    /// An answer was typed into the window.
    ActionDispatched { state: String, text: String },
    /// Typing into the window failed.
    DispatchFailed { error: String },
    /// The window text could not be read.
    ReadFailed { error: String },
    /// The loop stopped.
    SessionEnded {
        cycles: u64,
        dispatched: u64,
        skipped: u64,
    },
}

/// Writer for JSON lines activity logs.
pub struct ActivityLog {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl ActivityLog {
    /// Open (or create) the log at `path`, creating parent directories.
    /// Existing content is kept; new entries are appended.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn log(&self, event: LogEvent) -> Result<()> {
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        };

        let json = serde_json::to_string(&entry).context("failed to serialize log entry")?;

        debug!(event = %json, "activity log");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("activity log writer poisoned"))?;
        writeln!(writer, "{json}").context("failed to write log entry")?;
        writer.flush().context("failed to flush log")?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_to_json() {
        let entry = LogEntry {
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            event: LogEvent::ActionDispatched {
                state: "awaiting-input".to_string(),
                text: "y".to_string(),
            },
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event\":\"action_dispatched\""));
        assert!(json.contains("\"text\":\"y\""));
        assert!(json.contains("\"timestamp\":\"2026-01-01T00:00:00+00:00\""));
    }

    #[test]
    fn write_and_read_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("activity.jsonl");

        let log = ActivityLog::new(&log_path).unwrap();
        log.log(LogEvent::SessionStarted {
            window: "'work:cursor' (%1)".to_string(),
        })
        .unwrap();
        log.log(LogEvent::QuerySkipped {
            reason: "empty answer".to_string(),
        })
        .unwrap();
        log.log(LogEvent::SessionEnded {
            cycles: 3,
            dispatched: 1,
            skipped: 1,
        })
        .unwrap();

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        for line in &lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("event").is_some());
            let ts = parsed["timestamp"].as_str().unwrap();
            assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "bad timestamp {ts}");
        }

        assert!(lines[0].contains("\"event\":\"session_started\""));
        assert!(lines[1].contains("\"event\":\"query_skipped\""));
        assert!(lines[2].contains("\"event\":\"session_ended\""));
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("deep").join("nested").join("run.jsonl");

        let log = ActivityLog::new(&log_path).unwrap();
        log.log(LogEvent::ReadFailed {
            error: "capture-pane failed".to_string(),
        })
        .unwrap();

        assert!(log_path.exists());
        assert_eq!(log.path(), log_path);
    }

    #[test]
    fn appends_to_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("append.jsonl");

        {
            let log = ActivityLog::new(&log_path).unwrap();
            log.log(LogEvent::DispatchFailed {
                error: "no pane".to_string(),
            })
            .unwrap();
        }
        {
            let log = ActivityLog::new(&log_path).unwrap();
            log.log(LogEvent::QuerySent {
                state: "idle".to_string(),
                directive: "Continue".to_string(),
            })
            .unwrap();
        }

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
