//! Log domain types

use serde::{Deserialize, Serialize};

/// A log entry from job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// Renders the entry as a line of the persisted job log
    ///
    /// Info and debug lines are written verbatim so that process output
    /// reads exactly as the tool printed it.
    pub fn render(&self) -> String {
        match self.level {
            LogLevel::Debug | LogLevel::Info => self.message.clone(),
            LogLevel::Warning => format!("WARNING: {}", self.message),
            LogLevel::Error => format!("ERROR: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
