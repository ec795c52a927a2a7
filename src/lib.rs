//! Support utilities for browser-facing tests.
//!
//! - [`locator`] finds the script that called a trace-capturing helper.
//! - [`waiter`] polls a predicate or selector until it holds, and waits for
//!   reads to stabilise.
//! - [`report`] collects test failures raised outside assertions.
//! - [`run_errors`] tracks errors raised while a test bundle loads.

pub mod adapter;
pub mod config;
pub mod locator;
pub mod logging;
pub mod report;
pub mod run_errors;
pub mod waiter;

pub use config::{TestUtilConfig, TestUtilConfigError, TestUtilConfigOverrides, Verbosity};
pub use locator::{LocationError, ScriptLocation, StackLocator};
pub use logging::TestUtilLogger;
pub use report::{FailureLog, FailureReporter, ReportExt, TestFailure, async_fail};
pub use run_errors::{LoadError, RunErrors, verify_load};
pub use waiter::{Check, Reading, WaitError, WaitHandle, WaitOptions, Waiter};
