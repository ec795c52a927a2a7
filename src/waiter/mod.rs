//! Time-bounded condition polling.
//!
//! A [`Waiter`] evaluates a [`Check`] immediately and then on a fixed
//! interval until it holds, the check fails, or the timeout elapses. Each
//! wait runs on its own Tokio task and owns its timers; the returned
//! [`WaitHandle`] resolves with the outcome. Timeouts are additionally
//! reported to the waiter's [`FailureReporter`], so a dropped handle still
//! fails the test.
//!
//! [`Waiter::wait_until_stable`] builds on the same loop and settles once a
//! read returns the same value twice in a row.

mod check;
mod poll;
mod stable;

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Duration;

use crate::config::TestUtilConfig;
use crate::logging::{TestUtilLogger, category};
use crate::report::{FailureReporter, TestFailure};

pub use check::{Check, CheckError, DocumentQuery};
pub use stable::{Reading, StabilityTracker};

use check::Condition;
use poll::{ActivePolls, PollState, SettleSummary, Settlement};

pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_INTERVAL_MS: u64 = 50;

/// Timing for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WaitOptions {
    pub timeout_ms: u64,
    pub interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    pub fn new(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            interval_ms,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Zero durations would either spin or time out before the first check.
    pub fn validate(&self) -> Result<(), WaitError> {
        if self.timeout_ms == 0 {
            return Err(WaitError::InvalidOptions {
                field: "timeout_ms",
            });
        }
        if self.interval_ms == 0 {
            return Err(WaitError::InvalidOptions {
                field: "interval_ms",
            });
        }
        Ok(())
    }
}

/// Errors surfaced by a [`WaitHandle`].
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("wait timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("check failed: {0}")]
    Check(#[source] CheckError),
    #[error("selector check '{selector}' needs a document to query")]
    MissingDocument { selector: String },
    #[error("{field} must be greater than zero")]
    InvalidOptions { field: &'static str },
    #[error("wait task ended without settling")]
    Aborted,
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// Outcome of a spawned wait.
///
/// The wait keeps running if the handle is dropped; there is no way to
/// cancel it from the outside.
#[derive(Debug)]
pub struct WaitHandle {
    rx: oneshot::Receiver<Result<(), WaitError>>,
}

impl WaitHandle {
    fn failed(err: WaitError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl Future for WaitHandle {
    type Output = Result<(), WaitError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(WaitError::Aborted)))
    }
}

/// Spawns condition waits on the current Tokio runtime.
#[derive(Clone)]
pub struct Waiter {
    options: WaitOptions,
    reporter: Arc<dyn FailureReporter>,
    document: Option<Arc<dyn DocumentQuery>>,
    logger: Arc<TestUtilLogger>,
    active: ActivePolls,
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("options", &self.options)
            .field("document", &self.document.is_some())
            .field("active_polls", &self.active.count())
            .finish()
    }
}

impl Waiter {
    pub fn new(reporter: Arc<dyn FailureReporter>) -> Self {
        Self {
            options: WaitOptions::default(),
            reporter,
            document: None,
            logger: Arc::new(TestUtilLogger::default()),
            active: ActivePolls::default(),
        }
    }

    /// Build a waiter using the configured default timing and logger.
    pub fn from_config(config: &TestUtilConfig, reporter: Arc<dyn FailureReporter>) -> Self {
        Self {
            options: config.wait_options(),
            logger: Arc::new(config.build_logger()),
            ..Self::new(reporter)
        }
    }

    pub fn with_document(mut self, document: Arc<dyn DocumentQuery>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_logger(mut self, logger: Arc<TestUtilLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_options(mut self, options: WaitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> WaitOptions {
        self.options
    }

    /// Number of waits of this waiter whose timers are still armed.
    pub fn active_polls(&self) -> usize {
        self.active.count()
    }

    /// Poll `check` until it holds, using `options` or the waiter defaults.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn wait(&self, check: impl Into<Check>, options: Option<WaitOptions>) -> WaitHandle {
        let options = options.unwrap_or(self.options);
        if let Err(err) = options.validate() {
            return WaitHandle::failed(err);
        }
        let condition = match self.bind(check.into()) {
            Ok(condition) => condition,
            Err(err) => return WaitHandle::failed(err),
        };

        let poll = PollState::start(options.interval(), options.timeout(), &self.active);
        let reporter = Arc::clone(&self.reporter);
        let logger = Arc::clone(&self.logger);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = drive(poll, condition, options, reporter.as_ref(), &logger).await;
            let _ = tx.send(outcome);
        });

        WaitHandle { rx }
    }

    /// Wait until `read` returns the same value on two consecutive ticks.
    pub fn wait_until_stable<T, P>(&self, mut read: P, options: Option<WaitOptions>) -> WaitHandle
    where
        T: PartialEq + Send + 'static,
        P: FnMut() -> T + Send + 'static,
    {
        self.try_wait_until_stable(
            move || Ok::<_, Infallible>(Reading::Value(read())),
            options,
        )
    }

    /// Like [`wait_until_stable`](Self::wait_until_stable) for reads that can
    /// answer [`Reading::UNSTABLE`].
    pub fn wait_until_stable_readings<T, P>(
        &self,
        mut read: P,
        options: Option<WaitOptions>,
    ) -> WaitHandle
    where
        T: PartialEq + Send + 'static,
        P: FnMut() -> Reading<T> + Send + 'static,
    {
        self.try_wait_until_stable(move || Ok::<_, Infallible>(read()), options)
    }

    /// Stability wait for a fallible read. A read error ends the wait.
    pub fn try_wait_until_stable<T, P, E>(
        &self,
        mut read: P,
        options: Option<WaitOptions>,
    ) -> WaitHandle
    where
        T: PartialEq + Send + 'static,
        P: FnMut() -> Result<Reading<T>, E> + Send + 'static,
        E: Into<CheckError>,
    {
        let mut tracker = StabilityTracker::new();
        let check = Check::try_predicate(move || -> Result<bool, CheckError> {
            let current = read().map_err(Into::<CheckError>::into)?;
            Ok(tracker.observe(current))
        });
        self.wait(check, options)
    }

    fn bind(&self, check: Check) -> Result<Condition, WaitError> {
        match check {
            Check::Predicate(predicate) => Ok(Condition::Predicate(predicate)),
            Check::Selector(selector) => match &self.document {
                Some(document) => Ok(Condition::Selector {
                    selector,
                    document: Arc::clone(document),
                }),
                None => Err(WaitError::MissingDocument { selector }),
            },
        }
    }
}

async fn drive(
    mut poll: PollState,
    mut condition: Condition,
    options: WaitOptions,
    reporter: &dyn FailureReporter,
    logger: &TestUtilLogger,
) -> Result<(), WaitError> {
    loop {
        tokio::select! {
            biased;
            _ = poll.interval.tick() => {
                poll.record_tick();
                // A check still running at the deadline loses to it.
                let outcome = tokio::select! {
                    biased;
                    outcome = condition.evaluate() => Some(outcome),
                    _ = &mut poll.deadline => None,
                };
                match outcome {
                    Some(Ok(true)) => {
                        log_settled(logger, &poll.settle(Settlement::Resolved));
                        return Ok(());
                    }
                    Some(Ok(false)) if poll.deadline_passed() => {
                        return Err(time_out(poll, options, reporter, logger));
                    }
                    Some(Ok(false)) => {}
                    Some(Err(source)) => {
                        log_settled(logger, &poll.settle(Settlement::Rejected));
                        return Err(WaitError::Check(source));
                    }
                    None => return Err(time_out(poll, options, reporter, logger)),
                }
            }
            _ = &mut poll.deadline => {
                return Err(time_out(poll, options, reporter, logger));
            }
        }
    }
}

fn time_out(
    poll: PollState,
    options: WaitOptions,
    reporter: &dyn FailureReporter,
    logger: &TestUtilLogger,
) -> WaitError {
    let summary = poll.settle(Settlement::TimedOut);
    let err = WaitError::Timeout {
        timeout_ms: options.timeout_ms,
    };
    logger.error(category::WAIT, err.to_string(), Some(summary_json(&summary)));
    reporter.report_failure(
        TestFailure::new(err.to_string()).with_category(category::WAIT),
    );
    err
}

fn log_settled(logger: &TestUtilLogger, summary: &SettleSummary) {
    logger.debug(
        category::WAIT,
        format!(
            "wait {} after {}ms",
            summary.settlement.label(),
            summary.elapsed.as_millis()
        ),
        Some(summary_json(summary)),
    );
}

fn summary_json(summary: &SettleSummary) -> serde_json::Value {
    json!({
        "ticks": summary.ticks,
        "elapsedMs": u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
    })
}
