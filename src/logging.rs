//! Diagnostics emitted by waits, failure reporters and load checks.
//!
//! Every record belongs to one of the [`category`] constants. Records pass a
//! [`Verbosity`] filter and then go either to an installed sink (tests use
//! one to assert on what a wait did) or to the `log` facade under the
//! `testutil::<category>` target.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::Verbosity;

/// Categories attached to records.
pub mod category {
    /// Settlement of a condition or stability wait.
    pub const WAIT: &str = "wait";
    /// A test failure raised outside an assertion.
    pub const FAILURE: &str = "failure";
    /// An error recorded while a test bundle loads.
    pub const LOAD: &str = "load";
}

/// Receives records instead of the `log` facade.
pub type LogCallback = Arc<dyn Fn(&LogRecord) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    /// Lowest verbosity at which records of this level are kept.
    fn min_verbosity(self) -> Verbosity {
        match self {
            LogLevel::Error => Verbosity::Minimal,
            LogLevel::Info => Verbosity::Medium,
            LogLevel::Debug => Verbosity::Detailed,
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)?;
        match &self.fields {
            Some(fields) if !fields.is_null() => write!(f, " {fields}"),
            _ => Ok(()),
        }
    }
}

/// Cheap to clone; clones share the sink.
#[derive(Clone, Default)]
pub struct TestUtilLogger {
    verbose: Verbosity,
    sink: Option<LogCallback>,
}

impl fmt::Debug for TestUtilLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUtilLogger")
            .field("verbose", &self.verbose)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl TestUtilLogger {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: LogCallback) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn verbose(&self) -> Verbosity {
        self.verbose
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level.min_verbosity().as_u8() <= self.verbose.as_u8()
    }

    pub fn emit(
        &self,
        level: LogLevel,
        category: &'static str,
        message: impl Into<String>,
        fields: Option<Value>,
    ) {
        if !self.enabled(level) {
            return;
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            category,
            message: message.into(),
            fields,
        };
        match &self.sink {
            Some(sink) => sink(&record),
            None => {
                let target = format!("testutil::{category}");
                log::log!(target: target.as_str(), log::Level::from(level), "{record}");
            }
        }
    }

    pub fn error(&self, category: &'static str, message: impl Into<String>, fields: Option<Value>) {
        self.emit(LogLevel::Error, category, message, fields);
    }

    pub fn info(&self, category: &'static str, message: impl Into<String>, fields: Option<Value>) {
        self.emit(LogLevel::Info, category, message, fields);
    }

    pub fn debug(&self, category: &'static str, message: impl Into<String>, fields: Option<Value>) {
        self.emit(LogLevel::Debug, category, message, fields);
    }
}
