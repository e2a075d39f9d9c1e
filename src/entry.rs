//! Log entry model.
//!
//! Entries are captured once at log-call time and never mutated afterwards.
//! A [`LogBatch`] is the unit handed to a sink on every flush attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier stamped on every batch produced by this crate.
const BATCH_SOURCE: &str = "buffered-sink";

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// A single captured log record awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique id assigned at capture time
    pub id: Uuid,

    /// When the record was emitted
    pub timestamp: DateTime<Utc>,

    /// Log severity level
    pub level: LogLevel,

    /// Emitting component (the tracing target for captured events)
    pub target: String,

    /// Log message content
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Additional structured fields recorded with the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, serde_json::Value>>,
}

impl LogEntry {
    /// Capture a new log entry stamped with the current time.
    pub fn new(target: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            target: target.into(),
            message: message.into(),
            module_path: None,
            file: None,
            line: None,
            fields: None,
        }
    }

    /// Attach structured fields to the entry.
    pub fn with_fields(mut self, fields: HashMap<String, serde_json::Value>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Attach source location metadata.
    pub fn with_location(
        mut self,
        module_path: Option<&str>,
        file: Option<&str>,
        line: Option<u32>,
    ) -> Self {
        self.module_path = module_path.map(str::to_string);
        self.file = file.map(str::to_string);
        self.line = line;
        self
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            self.timestamp.to_rfc3339(),
            self.level.to_string().to_uppercase(),
            self.target,
            self.message
        )
    }
}

/// The full set of entries removed from the buffer for one flush attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatch {
    /// Entries in the order they were appended
    pub logs: Vec<LogEntry>,

    /// Id for idempotent delivery on the receiving side
    pub batch_id: Uuid,

    /// Identifier of the process sending the batch
    pub source: String,

    pub created_at: DateTime<Utc>,
}

impl LogBatch {
    /// Create a new batch from entries that were swapped out of the buffer.
    pub fn new(logs: Vec<LogEntry>) -> Self {
        Self {
            logs,
            batch_id: Uuid::new_v4(),
            source: BATCH_SOURCE.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Get the number of logs in the batch.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Messages of every entry, oldest first.
    pub fn messages(&self) -> Vec<&str> {
        self.logs.iter().map(|entry| entry.message.as_str()).collect()
    }

    /// Give the entries back, e.g. to requeue them after a failed send.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_serialization() {
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), "\"info\"");
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        assert_eq!(serde_json::to_string(&LogLevel::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn test_log_level_deserialization() {
        let level: LogLevel = serde_json::from_str("\"debug\"").unwrap();
        assert_eq!(level, LogLevel::Debug);
    }

    #[test]
    fn test_log_level_from_tracing() {
        assert_eq!(LogLevel::from(&tracing::Level::TRACE), LogLevel::Trace);
        assert_eq!(LogLevel::from(&tracing::Level::INFO), LogLevel::Info);
        assert_eq!(LogLevel::from(&tracing::Level::ERROR), LogLevel::Error);
    }

    #[test]
    fn test_log_level_ordering() {
        let levels = [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ];
        assert!(levels.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_log_entry_creation() {
        let entry = LogEntry::new("app::db", LogLevel::Warn, "slow query");

        assert_eq!(entry.target, "app::db");
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.message, "slow query");
        assert!(entry.fields.is_none());
        assert!(entry.line.is_none());
    }

    #[test]
    fn test_log_entry_ids_are_unique() {
        let a = LogEntry::new("app", LogLevel::Info, "same");
        let b = LogEntry::new("app", LogLevel::Info, "same");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_log_entry_with_fields_and_location() {
        let mut fields = HashMap::new();
        fields.insert("user_id".to_string(), serde_json::json!(42));

        let entry = LogEntry::new("app", LogLevel::Info, "login")
            .with_fields(fields)
            .with_location(Some("app::auth"), Some("src/auth.rs"), Some(17));

        assert_eq!(entry.fields.as_ref().unwrap()["user_id"], serde_json::json!(42));
        assert_eq!(entry.module_path.as_deref(), Some("app::auth"));
        assert_eq!(entry.file.as_deref(), Some("src/auth.rs"));
        assert_eq!(entry.line, Some(17));
    }

    #[test]
    fn test_log_entry_serialization_skips_empty_optionals() {
        let entry = LogEntry::new("app", LogLevel::Info, "hello");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["level"], "info");
        assert_eq!(json["message"], "hello");
        assert!(json.get("fields").is_none());
        assert!(json.get("file").is_none());
    }

    #[test]
    fn test_log_entry_display() {
        let entry = LogEntry::new("app", LogLevel::Error, "disk full");
        let rendered = entry.to_string();

        assert!(rendered.ends_with(" ERROR app: disk full"));
        assert!(rendered.starts_with(&entry.timestamp.to_rfc3339()));
    }

    #[test]
    fn test_log_batch_creation() {
        let batch = LogBatch::new(vec![
            LogEntry::new("app", LogLevel::Info, "first"),
            LogEntry::new("app", LogLevel::Info, "second"),
        ]);

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.source, "buffered-sink");
        assert_eq!(batch.messages(), vec!["first", "second"]);
    }

    #[test]
    fn test_log_batch_into_entries_keeps_order() {
        let batch = LogBatch::new(vec![
            LogEntry::new("app", LogLevel::Info, "a"),
            LogEntry::new("app", LogLevel::Info, "b"),
        ]);
        let messages: Vec<String> = batch.into_entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn test_log_batch_serialization() {
        let batch = LogBatch::new(vec![LogEntry::new("app", LogLevel::Info, "x")]);
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["logs"].as_array().unwrap().len(), 1);
        assert_eq!(json["source"], "buffered-sink");
        assert!(json["batch_id"].is_string());
    }
}
