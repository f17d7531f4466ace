//! The per-session append-only log (§3, §4.7): a session-scoped user
//! artifact, ordered by enqueue timestamp, distinct from the
//! operator-facing `tracing` spans (§4.12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn to_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.to_rfc3339(),
            self.level.as_str(),
            self.message
        )
    }
}

/// Append-only; nothing ever removes or reorders an entry once written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The `{session-id}/log.txt` artifact view (§6.4): newline-delimited
    /// `[ISO-8601] LEVEL: message`.
    pub fn to_text(&self) -> String {
        self.entries.iter().map(LogEntry::to_line).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_append_only_and_renders_as_text() {
        let mut log = SessionLog::new();
        log.push(LogLevel::Info, "started", None);
        log.push(LogLevel::Warn, "degraded to heuristic", None);
        assert_eq!(log.entries().len(), 2);
        let text = log.to_text();
        assert!(text.contains("INFO: started"));
        assert!(text.contains("WARN: degraded to heuristic"));
    }
}
