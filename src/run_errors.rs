//! Errors raised while a test bundle loads.
//!
//! Each run owns a [`RunErrors`] collector. Errors are recorded as they
//! happen and read back exactly once by [`RunErrors::finish`], which also
//! resets the collector for the next run.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::logging::{TestUtilLogger, category};
use crate::report::{FailureReporter, TestFailure};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("{count} error(s) raised while loading, first: {first}")]
    ErrorsDuringLoad { count: usize, first: String },
}

/// Per-run error collector.
#[derive(Debug, Default)]
pub struct RunErrors {
    errors: Mutex<Vec<String>>,
    logger: Option<Arc<TestUtilLogger>>,
}

impl RunErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log every recorded error at ERROR level.
    pub fn with_logger(mut self, logger: Arc<TestUtilLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Forget anything left over from a previous run.
    pub fn begin_run(&self) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn record(&self, message: impl Into<String>) {
        let message = message.into();
        if let Some(logger) = &self.logger {
            logger.error(category::LOAD, message.clone(), None);
        }
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    pub fn has_errors(&self) -> bool {
        !self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Drain the collected errors, failing if there were any.
    pub fn finish(&self) -> Result<(), LoadError> {
        let errors = std::mem::take(
            &mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = errors.len();
        match errors.into_iter().next() {
            Some(first) => Err(LoadError::ErrorsDuringLoad { count, first }),
            None => Ok(()),
        }
    }
}

impl FailureReporter for RunErrors {
    fn report_failure(&self, failure: TestFailure) {
        self.record(failure.to_string());
    }
}

/// Check that the bundle loaded cleanly.
pub fn verify_load(errors: &RunErrors) -> Result<(), LoadError> {
    errors.finish()
}
