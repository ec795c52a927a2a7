//! Explicit test-failure reporting.
//!
//! A wait that times out does not only reject its future, it also reports a
//! [`TestFailure`] here so the failure surfaces even when the caller dropped
//! the handle or forgot to inspect the result.

use std::fmt::{self, Display};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logging::{TestUtilLogger, category};

/// A single failure raised outside the normal assertion flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TestFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

impl Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "[{category}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Sink for failures that must be visible to the test run.
pub trait FailureReporter: Send + Sync {
    fn report_failure(&self, failure: TestFailure);
}

impl<T: FailureReporter + ?Sized> FailureReporter for Arc<T> {
    fn report_failure(&self, failure: TestFailure) {
        (**self).report_failure(failure);
    }
}

/// In-memory reporter. Tests hold on to it and inspect or assert on it once
/// the scenario is over.
#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Mutex<Vec<TestFailure>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<TestFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Panic with every recorded failure if any were reported.
    #[track_caller]
    pub fn assert_clean(&self) {
        let failures = self.failures();
        if !failures.is_empty() {
            let listing = failures
                .iter()
                .map(|failure| format!("  - {failure}"))
                .collect::<Vec<_>>()
                .join("\n");
            panic!("{} test failure(s) reported:\n{listing}", failures.len());
        }
    }
}

impl FailureReporter for FailureLog {
    fn report_failure(&self, failure: TestFailure) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(failure);
    }
}

/// Reporter that logs every failure at ERROR level and optionally forwards it.
pub struct LoggingReporter {
    logger: Arc<TestUtilLogger>,
    inner: Option<Arc<dyn FailureReporter>>,
}

impl LoggingReporter {
    pub fn new(logger: Arc<TestUtilLogger>) -> Self {
        Self {
            logger,
            inner: None,
        }
    }

    pub fn forwarding_to(mut self, inner: Arc<dyn FailureReporter>) -> Self {
        self.inner = Some(inner);
        self
    }
}

impl fmt::Debug for LoggingReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingReporter")
            .field("logger", &self.logger)
            .field("forwarding", &self.inner.is_some())
            .finish()
    }
}

impl FailureReporter for LoggingReporter {
    fn report_failure(&self, failure: TestFailure) {
        self.logger
            .error(category::FAILURE, failure.to_string(), None);
        if let Some(inner) = &self.inner {
            inner.report_failure(failure);
        }
    }
}

/// Build a completion callback that reports `error` as a test failure when one
/// is passed, then calls `done` in both cases.
///
/// ```
/// use std::sync::Arc;
/// use testutil_rs::report::{async_fail, FailureLog};
///
/// let log = Arc::new(FailureLog::new());
/// let finish = async_fail(log.clone(), || println!("done"));
/// finish(Some("element never appeared"));
/// assert_eq!(log.len(), 1);
/// ```
pub fn async_fail<E, D>(
    reporter: Arc<dyn FailureReporter>,
    done: D,
) -> impl FnOnce(Option<E>) + Send + 'static
where
    E: Display + 'static,
    D: FnOnce() + Send + 'static,
{
    move |error: Option<E>| {
        if let Some(error) = error {
            reporter.report_failure(TestFailure::new(error.to_string()));
        }
        done();
    }
}

/// Route the error half of a `Result` into a [`FailureReporter`].
pub trait ReportExt<T> {
    /// Report the error, if any, and keep only the success value.
    fn or_report(self, reporter: &dyn FailureReporter) -> Option<T>;
}

impl<T, E: Display> ReportExt<T> for Result<T, E> {
    fn or_report(self, reporter: &dyn FailureReporter) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                reporter.report_failure(TestFailure::new(err.to_string()));
                None
            }
        }
    }
}
