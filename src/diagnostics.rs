//! Structured diagnostics for the trigger core.
//!
//! Registration and gateway code never log directly. They report through a
//! [`DiagnosticSink`] handed to them, so the binary can forward to `tracing`
//! while tests read back what was emitted.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single key/value attached to a diagnostic.
pub type Field<'a> = (&'a str, String);

pub trait DiagnosticSink: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &[Field<'_>]);

    fn debug(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &[Field<'_>]) {
        self.log(Level::Error, message, fields);
    }
}

/// Forwards diagnostics to the `tracing` subscriber installed by the binary.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    trigger: String,
}

impl TracingSink {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }
}

struct Rendered<'a, 'b>(&'a [Field<'b>]);

impl fmt::Display for Rendered<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl DiagnosticSink for TracingSink {
    fn log(&self, level: Level, message: &str, fields: &[Field<'_>]) {
        let fields = Rendered(fields);
        match level {
            Level::Debug => {
                tracing::debug!(trigger = %self.trigger, fields = %fields, "{}", message)
            }
            Level::Info => {
                tracing::info!(trigger = %self.trigger, fields = %fields, "{}", message)
            }
            Level::Warn => {
                tracing::warn!(trigger = %self.trigger, fields = %fields, "{}", message)
            }
            Level::Error => {
                tracing::error!(trigger = %self.trigger, fields = %fields, "{}", message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// First record at `level` whose message contains `needle`.
    pub fn find(&self, level: Level, needle: &str) -> Option<Record> {
        self.records()
            .into_iter()
            .find(|r| r.level == level && r.message.contains(needle))
    }
}

impl DiagnosticSink for MemorySink {
    fn log(&self, level: Level, message: &str, fields: &[Field<'_>]) {
        let record = Record {
            level,
            message: message.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
