//! Hierarchical diagnostic log produced by every validation stage.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ErrorCode;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

/// Ordered entries of one pipeline stage plus the logs of the stages it ran.
///
/// Appending never fails. The severity of a log is computed on demand by
/// walking the tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Log {
    pub title: String,
    entries: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    children: Vec<Log>,
}

impl Log {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message.into(), None);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message.into(), None);
    }

    pub fn warn(&mut self, message: impl Into<String>, code: ErrorCode) {
        self.push(Level::Warning, message.into(), Some(code));
    }

    pub fn error(&mut self, message: impl Into<String>, code: ErrorCode) {
        self.push(Level::Error, message.into(), Some(code));
    }

    /// Records an entry that stops the current stage. The caller is expected
    /// to return a result without a value right after.
    pub fn fatal(&mut self, message: impl Into<String>, code: ErrorCode) {
        self.push(Level::Fatal, message.into(), Some(code));
    }

    fn push(&mut self, level: Level, message: String, code: Option<ErrorCode>) {
        trace!(stage = %self.title, %level, code = ?code, "{}", message);
        self.entries.push(LogEntry {
            level,
            message,
            code,
        });
    }

    pub fn add_child(&mut self, child: Log) {
        self.children.push(child);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn children(&self) -> &[Log] {
        &self.children
    }

    /// Worst level among this log's entries and all of its descendants.
    pub fn level(&self) -> Option<Level> {
        let own = self.entries.iter().map(|e| e.level).max();
        let nested = self.children.iter().filter_map(Log::level).max();
        own.max(nested)
    }

    /// Whether this log (not its children) recorded a fatal entry.
    pub fn is_fatal(&self) -> bool {
        self.entries.iter().any(|e| e.level == Level::Fatal)
    }

    /// All entries of the tree in depth-first order.
    pub fn flatten(&self) -> Vec<&LogEntry> {
        let mut out: Vec<&LogEntry> = self.entries.iter().collect();
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.flatten().iter().any(|e| e.code == Some(code))
    }

    pub fn has_message(&self, needle: &str) -> bool {
        self.flatten().iter().any(|e| e.message.contains(needle))
    }

    /// Number of entries at `level` or above, anywhere in the tree.
    pub fn count_at_least(&self, level: Level) -> usize {
        self.flatten().iter().filter(|e| e.level >= level).count()
    }

    /// Indented text rendering of entries at `min_level` or above.
    pub fn render(&self, min_level: Level) -> String {
        let mut out = String::new();
        self.render_into(&mut out, min_level, 0);
        out
    }

    fn render_into(&self, out: &mut String, min_level: Level, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{}{}\n", indent, self.title));
        for entry in self.entries.iter().filter(|e| e.level >= min_level) {
            match entry.code {
                Some(code) => out.push_str(&format!(
                    "{}  [{}] {} ({})\n",
                    indent,
                    entry.level,
                    entry.message,
                    code.number()
                )),
                None => {
                    out.push_str(&format!("{}  [{}] {}\n", indent, entry.level, entry.message))
                }
            }
        }
        for child in &self.children {
            child.render_into(out, min_level, depth + 1);
        }
    }
}

/// Output of one stage: a value the next stage can use, if any, and the
/// stage's log.
///
/// `result` is `None` when the stage could not produce anything usable. A
/// present result may still come with errors in the log.
#[derive(Debug)]
pub struct ValidationResult<T> {
    pub result: Option<T>,
    pub log: Log,
}

impl<T> ValidationResult<T> {
    pub fn new(result: Option<T>, log: Log) -> Self {
        Self { result, log }
    }

    pub fn ok(result: T, log: Log) -> Self {
        Self {
            result: Some(result),
            log,
        }
    }

    pub fn failed(log: Log) -> Self {
        Self { result: None, log }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ValidationResult<U> {
        ValidationResult {
            result: self.result.map(f),
            log: self.log,
        }
    }

    pub fn into_parts(self) -> (Option<T>, Log) {
        (self.result, self.log)
    }
}
