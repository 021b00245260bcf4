//! Per-workflow execution log (`execution.log`, JSON lines).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::step::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted,
    StepSkipped,
    StepStarted,
    StepSucceeded,
    StepRetry,
    StepFailed,
    RunCompleted,
    RunFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub event: LogEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Append-only log beside a workflow's artifacts.
///
/// Logging is best effort: a write failure is reported through `tracing`
/// and never fails the run.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    pub const FILE_NAME: &'static str = "execution.log";

    pub fn new(workflow_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: workflow_dir.into().join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn record(&self, event: LogEvent, step: Option<StepId>, attempt: Option<u32>, detail: Option<&str>) {
        let entry = LogEntry {
            ts: Utc::now(),
            event,
            step,
            attempt,
            detail: detail.map(str::to_string),
        };
        if let Err(e) = self.append(&entry) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write execution log");
        }
    }

    fn append(&self, entry: &LogEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(line.as_bytes())
    }

    /// Read all entries; unparseable lines are skipped.
    pub fn entries(&self) -> Vec<LogEntry> {
        fs::read_to_string(&self.path)
            .map(|content| {
                content
                    .lines()
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::new(dir.path().join("wf-1"));
        log.record(LogEvent::RunStarted, None, None, Some("targets: review"));
        log.record(LogEvent::StepRetry, Some(StepId::Plan), Some(2), Some("rate limited"));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event, LogEvent::StepRetry);
        assert_eq!(entries[1].step, Some(StepId::Plan));
        assert_eq!(entries[1].attempt, Some(2));

        let raw = fs::read_to_string(log.path()).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"event\":\"run_started\""));
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ExecutionLog::new(dir.path()).entries().is_empty());
    }
}
