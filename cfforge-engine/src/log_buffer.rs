//! Step log
//!
//! Collects the human-readable log of a build or deployment while it runs.
//! Clones share the same buffer so a log can be handed to the process runner
//! and to strategies without copying it around.

use cfforge_core::domain::log::{LogEntry, LogLevel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Default)]
pub struct StepLog {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_entry(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    fn push(&self, level: LogLevel, message: impl Into<String>) {
        self.add_entry(LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    /// Appends a line of captured process output
    pub fn output(&self, line: impl Into<String>) {
        self.push(LogLevel::Debug, line);
    }

    /// Appends every line of an already rendered log
    pub fn append_rendered(&self, text: &str) {
        for line in text.lines() {
            self.push(LogLevel::Info, line);
        }
    }

    /// Snapshot of the entries written so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Renders the log as persisted on the job record, one entry per line
    pub fn render(&self) -> String {
        let buffer = self.lock();
        let mut text = String::new();
        for entry in buffer.iter() {
            text.push_str(&entry.render());
            text.push('\n');
        }
        text
    }
}
