//! Per-operation log transcript.
//!
//! Every workflow step appends a [`LogEntry`]. Entries are mirrored to
//! `tracing` and, when the caller supplied one, to a synchronous sink so
//! progress can be streamed without the workflows knowing the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Progress
    Info,
    /// A step completed
    Success,
    /// A step failed
    Error,
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Human-readable message
    pub text: String,
    /// Severity
    #[serde(rename = "type")]
    pub kind: LogKind,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

/// Callback receiving each entry as it is recorded
pub type LogSink<'a> = &'a (dyn Fn(&LogEntry) + Send + Sync);

/// Accumulates a transcript for one operation
pub struct ProvisionLog<'a> {
    entries: Vec<LogEntry>,
    sink: Option<LogSink<'a>>,
}

impl<'a> ProvisionLog<'a> {
    /// Start an empty transcript
    pub fn new(sink: Option<LogSink<'a>>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
        }
    }

    fn push(&mut self, kind: LogKind, text: String) {
        let entry = LogEntry {
            text,
            kind,
            timestamp: Utc::now(),
        };
        if let Some(sink) = self.sink {
            sink(&entry);
        }
        self.entries.push(entry);
    }

    /// Record progress
    pub fn info(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.push(LogKind::Info, text);
    }

    /// Record a non-fatal problem; kept as an info entry in the transcript
    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        warn!("{}", text);
        self.push(LogKind::Info, format!("warning: {}", text));
    }

    /// Record a completed step
    pub fn success(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.push(LogKind::Success, text);
    }

    /// Record a failure
    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        error!("{}", text);
        self.push(LogKind::Error, text);
    }

    /// Entries recorded so far
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Consume the transcript
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_entries_reach_sink_in_order() {
        let seen = Mutex::new(Vec::new());
        let sink = |entry: &LogEntry| seen.lock().unwrap().push(entry.text.clone());
        let mut log = ProvisionLog::new(Some(&sink));

        log.info("one");
        log.success("two");
        log.error("three");

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
        let kinds: Vec<_> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![LogKind::Info, LogKind::Success, LogKind::Error]);
    }

    #[test]
    fn test_entry_serializes_kind_as_type() {
        let mut log = ProvisionLog::new(None);
        log.warn("slow");
        let json = serde_json::to_value(&log.into_entries()[0]).unwrap();
        assert_eq!(json["type"], "info");
        assert_eq!(json["text"], "warning: slow");
    }
}
